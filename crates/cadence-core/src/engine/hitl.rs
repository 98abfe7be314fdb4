//! Human-in-the-loop gate: pause checkpoints that suspend an execution and
//! hand control to an external responder.
//!
//! The gate never blocks in-process. Firing a gate persists a request,
//! flips the execution to `waiting_hitl`, optionally notifies a channel,
//! and returns; resumption is a separate call that may come from a
//! different process entirely (the request carries a context snapshot for
//! exactly that reason).

use serde_json::Value;

use crate::engine::resolver::interpolate;
use crate::error::EngineError;
use crate::models::execution::StepResult;
use crate::models::hitl::{HitlConfig, HitlPosition, HitlRequest};
use crate::notify::Notifier;
use crate::store::{ExecutionStore, HitlRequestStore};

pub struct HitlGate {
    requests: HitlRequestStore,
    executions: ExecutionStore,
    notifier: Notifier,
}

/// Decide whether a gate fires. Gates are skipped in simulation unless the
/// caller explicitly disables that behavior.
pub fn should_trigger(
    config: Option<&HitlConfig>,
    simulation: bool,
    skip_in_simulation: bool,
) -> bool {
    let Some(config) = config else {
        return false;
    };
    if !config.enabled {
        return false;
    }
    if simulation && skip_in_simulation {
        return false;
    }
    true
}

impl HitlGate {
    pub fn new(
        requests: HitlRequestStore,
        executions: ExecutionStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            requests,
            executions,
            notifier,
        }
    }

    /// Fire a gate: persist the request, suspend the execution, and send a
    /// best-effort notification. Returns the persisted request for the
    /// orchestrator to surface to the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn open_request(
        &self,
        execution_id: &str,
        sequence_key: &str,
        step_index: usize,
        position: HitlPosition,
        config: &HitlConfig,
        context: &Value,
        mock_data: &Value,
        organization_id: &str,
        step_results: &[StepResult],
    ) -> Result<HitlRequest, EngineError> {
        let prompt = interpolate(&config.prompt, context, mock_data);

        let request = HitlRequest::new(
            execution_id.to_string(),
            sequence_key.to_string(),
            step_index,
            position,
            prompt,
            config,
            context.clone(),
        );

        self.requests.save(&request).await?;
        self.executions
            .mark_waiting_hitl(execution_id, &request.id, step_results)
            .await?;

        tracing::info!(
            "[HitlGate] Execution {} paused at step {} ({}), request {}",
            execution_id,
            step_index,
            position.as_str(),
            request.id
        );

        // Notification failure must not fail the gate; delivery is detached.
        if config.channels.iter().any(|c| c == "slack") {
            self.notifier.notify_detached(
                &request.id,
                organization_id,
                &request.prompt,
                config.slack_channel_id.as_deref(),
            );
        }

        Ok(request)
    }

    /// Resolve a pending request exactly once and flip the owning execution
    /// back to `running`. On failure nothing further is mutated; the caller
    /// sees the error outright.
    pub async fn resolve_request(
        &self,
        request_id: &str,
        response: Value,
        response_context: Option<Value>,
    ) -> Result<HitlRequest, EngineError> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("HITL request {}", request_id)))?;

        self.requests.resolve(request_id, &response).await?;
        self.executions
            .update_status(
                &request.execution_id,
                crate::models::execution::ExecutionStatus::Running,
            )
            .await?;

        tracing::info!(
            "[HitlGate] Request {} resolved, execution {} back to running",
            request_id,
            request.execution_id
        );

        let mut resolved = request;
        resolved.status = crate::models::hitl::HitlRequestStatus::Resolved;
        resolved.response = Some(match response_context {
            Some(ctx) => serde_json::json!({ "response": response, "context": ctx }),
            None => response,
        });
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hitl::TimeoutAction;

    fn config(enabled: bool) -> HitlConfig {
        HitlConfig {
            enabled,
            prompt: String::new(),
            options: vec![],
            default_value: None,
            channels: vec![],
            slack_channel_id: None,
            timeout_minutes: 60,
            timeout_action: TimeoutAction::UseDefault,
            request_type: "approval".to_string(),
            assigned_to_user_id: None,
        }
    }

    #[test]
    fn test_trigger_requires_enabled() {
        assert!(!should_trigger(None, false, true));
        assert!(!should_trigger(Some(&config(false)), false, true));
        assert!(should_trigger(Some(&config(true)), false, true));
    }

    #[test]
    fn test_simulation_skip_behavior() {
        let cfg = config(true);
        // Simulation skips gates by default
        assert!(!should_trigger(Some(&cfg), true, true));
        // Unless the caller disables the skip
        assert!(should_trigger(Some(&cfg), true, false));
    }
}
