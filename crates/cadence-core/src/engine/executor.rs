//! Sequence Engine — drives an ordered list of steps end-to-end.
//!
//! The engine:
//! 1. Persists one execution record per run, up front
//! 2. Executes steps strictly sequentially, threading an accumulating context
//! 3. Intercepts steps with human-in-the-loop gates and suspends the run
//! 4. Applies per-step failure policy (stop vs. continue)
//! 5. Persists terminal state (completed / failed / cancelled)
//!
//! Two live-mode strategies: the default client-driven loop below, or
//! delegated execution where the whole sequence is handed to the backend in
//! a single call and only the aggregate response is mapped back.
//!
//! State machine: `pending → running → {waiting_hitl ⇄ running}* →
//! {completed | failed | cancelled}`. Resume always re-enters `running`.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::engine::hitl::{should_trigger, HitlGate};
use crate::engine::mock::seed_dataset;
use crate::engine::step::StepExecutor;
use crate::error::{coerce_error_message, EngineError};
use crate::models::execution::{
    merge_output, new_context, ExecutionStatus, SequenceExecution, StepResult, StepStatus,
};
use crate::models::hitl::{HitlPosition, HitlRequest};
use crate::models::sequence::{OnFailure, Sequence};
use crate::remote::SkillClient;
use crate::store::ExecutionStore;

/// Caller-supplied options for one `execute()` call.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub user_id: String,
    pub organization_id: String,
    /// Simulation mode: steps produce mock outputs, nothing hits the backend
    pub simulation: bool,
    /// Hand the whole sequence to the backend in one call (live mode only)
    pub delegate: bool,
    /// Gates are skipped in simulation unless this is false
    pub skip_hitl_in_simulation: bool,
    /// Seed for `context.trigger.params`
    pub trigger_params: Value,
    /// Override for the simulation dataset (defaults to the built-in seed)
    pub mock_data: Option<Value>,
}

impl ExecuteOptions {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            simulation: false,
            delegate: false,
            skip_hitl_in_simulation: true,
            trigger_params: json!({}),
            mock_data: None,
        }
    }
}

/// Result of `execute()` / `resume_after_hitl()`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: Option<String>,
    pub success: bool,
    pub results: Vec<StepResult>,
    pub context: Value,
    pub error: Option<String>,
    pub waiting_hitl: bool,
    pub hitl_request: Option<HitlRequest>,
    pub hitl_position: Option<HitlPosition>,
    pub step_index: Option<usize>,
}

impl ExecutionOutcome {
    fn failed(execution_id: Option<String>, context: Value, error: String) -> Self {
        Self {
            execution_id,
            success: false,
            results: Vec::new(),
            context,
            error: Some(error),
            waiting_hitl: false,
            hitl_request: None,
            hitl_position: None,
            step_index: None,
        }
    }
}

/// Parameters threaded through the step loop (stable across resume).
struct RunParams {
    execution_id: String,
    organization_id: String,
    simulation: bool,
    skip_hitl_in_simulation: bool,
    mock_data: Value,
}

struct EngineInner {
    current_execution_id: Option<String>,
    current_hitl_request: Option<HitlRequest>,
    cancel: CancellationToken,
}

/// The sequence orchestration engine.
pub struct SequenceEngine {
    executions: ExecutionStore,
    gate: HitlGate,
    steps: StepExecutor,
    skills: SkillClient,
    inner: Arc<RwLock<EngineInner>>,
}

impl SequenceEngine {
    pub fn new(
        executions: ExecutionStore,
        gate: HitlGate,
        steps: StepExecutor,
        skills: SkillClient,
    ) -> Self {
        Self {
            executions,
            gate,
            steps,
            skills,
            inner: Arc::new(RwLock::new(EngineInner {
                current_execution_id: None,
                current_hitl_request: None,
                cancel: CancellationToken::new(),
            })),
        }
    }

    /// Execute a sequence. Precondition failures (missing user/org) are the
    /// only errors; every other failure mode is reported in the outcome.
    pub async fn execute(
        &self,
        sequence: &Sequence,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, EngineError> {
        if options.user_id.trim().is_empty() {
            return Err(EngineError::Precondition(
                "user id is required to execute a sequence".to_string(),
            ));
        }
        if options.organization_id.trim().is_empty() {
            return Err(EngineError::Precondition(
                "organization id is required to execute a sequence".to_string(),
            ));
        }

        let mock_data = if options.simulation {
            options.mock_data.clone().unwrap_or_else(seed_dataset)
        } else {
            options.mock_data.clone().unwrap_or_else(|| json!({}))
        };
        let context = new_context(options.trigger_params.clone());

        // Exactly one persisted row per run, created before any step work.
        let execution = SequenceExecution::new(
            sequence.key.clone(),
            options.organization_id.clone(),
            options.user_id.clone(),
            context.clone(),
            options.simulation,
            options.simulation.then(|| mock_data.clone()),
        );
        if let Err(e) = self.executions.save(&execution).await {
            tracing::error!("[SequenceEngine] Failed to create execution record: {}", e);
            return Ok(ExecutionOutcome::failed(
                None,
                context,
                format!("Failed to create execution record: {}", e),
            ));
        }

        let cancel = {
            let mut inner = self.inner.write().await;
            inner.current_execution_id = Some(execution.id.clone());
            inner.current_hitl_request = None;
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };

        tracing::info!(
            "[SequenceEngine] Execution {} started (sequence '{}', simulation={}, delegate={})",
            execution.id,
            sequence.key,
            options.simulation,
            options.delegate
        );

        let params = RunParams {
            execution_id: execution.id.clone(),
            organization_id: options.organization_id.clone(),
            simulation: options.simulation,
            skip_hitl_in_simulation: options.skip_hitl_in_simulation,
            mock_data,
        };

        let outcome = if !options.simulation && options.delegate {
            self.run_delegated(sequence, context, &params, &cancel).await
        } else {
            self.run_steps(sequence, context, Vec::new(), 0, None, &params, &cancel)
                .await?
        };
        Ok(outcome)
    }

    /// Resolve a pending HITL request and continue the run from the paused
    /// position. The request's context snapshot makes this callable from a
    /// fresh process.
    pub async fn resume_after_hitl(
        &self,
        sequence: &Sequence,
        request_id: &str,
        response: Value,
        response_context: Option<Value>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let resolved = self
            .gate
            .resolve_request(request_id, response.clone(), response_context)
            .await?;

        if resolved.sequence_key != sequence.key {
            return Err(EngineError::Precondition(format!(
                "Request {} belongs to sequence '{}', not '{}'",
                request_id, resolved.sequence_key, sequence.key
            )));
        }

        let execution = self
            .executions
            .get(&resolved.execution_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("execution {}", resolved.execution_id))
            })?;

        let ordered = sequence.ordered_steps();
        let step_key = ordered
            .get(resolved.step_index)
            .map(|s| s.step_key())
            .unwrap_or_else(|| format!("step_{}", resolved.step_index + 1));

        // Rebuild the context from the snapshot and merge the human response
        // where later input mappings can reach it.
        let mut context = resolved.execution_context.clone();
        merge_output(
            &mut context,
            &format!("{}_hitl_response", step_key),
            response,
        );

        let (start_index, skip_gate_at) = match resolved.position {
            HitlPosition::Before => (resolved.step_index, Some(resolved.step_index)),
            HitlPosition::After => (resolved.step_index + 1, None),
        };

        let cancel = {
            let mut inner = self.inner.write().await;
            inner.current_execution_id = Some(execution.id.clone());
            inner.current_hitl_request = None;
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };

        tracing::info!(
            "[SequenceEngine] Execution {} resuming at step {} after request {}",
            execution.id,
            start_index,
            request_id
        );

        let params = RunParams {
            execution_id: execution.id.clone(),
            organization_id: execution.organization_id.clone(),
            simulation: execution.is_simulation,
            skip_hitl_in_simulation: true,
            mock_data: execution
                .mock_data_used
                .clone()
                .unwrap_or_else(|| json!({})),
        };

        self.run_steps(
            sequence,
            context,
            execution.step_results,
            start_index,
            skip_gate_at,
            &params,
            &cancel,
        )
        .await
    }

    /// Abort the in-flight run. Best-effort: the persisted record is marked
    /// cancelled, but results already produced are kept.
    pub async fn cancel(&self) {
        let (execution_id, cancel) = {
            let inner = self.inner.read().await;
            (inner.current_execution_id.clone(), inner.cancel.clone())
        };
        cancel.cancel();

        if let Some(id) = execution_id {
            tracing::info!("[SequenceEngine] Cancelling execution {}", id);
            if let Err(e) = self
                .executions
                .finalize(&id, ExecutionStatus::Cancelled, &[], None, None, None)
                .await
            {
                tracing::warn!("[SequenceEngine] Failed to persist cancellation: {}", e);
            }
        }
    }

    /// Clear in-memory current-run state. Persisted records are untouched.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.current_execution_id = None;
        inner.current_hitl_request = None;
        inner.cancel = CancellationToken::new();
    }

    /// The request the engine is currently suspended on, if any.
    pub async fn current_hitl_request(&self) -> Option<HitlRequest> {
        self.inner.read().await.current_hitl_request.clone()
    }

    // ─── Client-driven step loop ──────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        sequence: &Sequence,
        mut context: Value,
        mut results: Vec<StepResult>,
        start_index: usize,
        skip_before_gate_at: Option<usize>,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        let ordered = sequence.ordered_steps();

        for (index, step) in ordered.iter().enumerate().skip(start_index) {
            // Abort observed between steps halts the loop without marking
            // the remaining steps.
            if cancel.is_cancelled() {
                self.executions
                    .finalize(
                        &params.execution_id,
                        ExecutionStatus::Cancelled,
                        &results,
                        None,
                        None,
                        None,
                    )
                    .await
                    .ok();
                return Ok(ExecutionOutcome {
                    execution_id: Some(params.execution_id.clone()),
                    success: false,
                    results,
                    context,
                    error: Some("Execution cancelled".to_string()),
                    waiting_hitl: false,
                    hitl_request: None,
                    hitl_position: None,
                    step_index: Some(index),
                });
            }

            // Gate before the step (suppressed for the gate just satisfied
            // by a resume).
            let suppress_before = skip_before_gate_at == Some(index);
            if !suppress_before {
                if let Some(config) = &step.hitl_before {
                    if should_trigger(
                        Some(config),
                        params.simulation,
                        params.skip_hitl_in_simulation,
                    ) {
                        return self
                            .suspend(
                                sequence,
                                index,
                                HitlPosition::Before,
                                config,
                                context,
                                results,
                                params,
                            )
                            .await;
                    }
                }
            }

            let result = self
                .steps
                .execute(
                    step,
                    index,
                    &context,
                    params.simulation,
                    &params.mock_data,
                    &params.organization_id,
                )
                .await;
            let step_failed = result.status == StepStatus::Failed;
            let output = result.output.clone();
            let error = result.error.clone();
            results.push(result);

            if !step_failed {
                if let Some(output) = output {
                    merge_output(&mut context, &step.output_key(), output);
                }

                if let Some(config) = &step.hitl_after {
                    if should_trigger(
                        Some(config),
                        params.simulation,
                        params.skip_hitl_in_simulation,
                    ) {
                        return self
                            .suspend(
                                sequence,
                                index,
                                HitlPosition::After,
                                config,
                                context,
                                results,
                                params,
                            )
                            .await;
                    }
                }
            } else {
                match step.on_failure {
                    OnFailure::Stop => {
                        let message = error.unwrap_or_else(|| "Step failed".to_string());
                        self.executions
                            .finalize(
                                &params.execution_id,
                                ExecutionStatus::Failed,
                                &results,
                                None,
                                Some(&message),
                                Some(index),
                            )
                            .await?;
                        return Ok(ExecutionOutcome {
                            execution_id: Some(params.execution_id.clone()),
                            success: false,
                            results,
                            context,
                            error: Some(message),
                            waiting_hitl: false,
                            hitl_request: None,
                            hitl_position: None,
                            step_index: Some(index),
                        });
                    }
                    OnFailure::Continue => {
                        tracing::warn!(
                            "[SequenceEngine] Step {} failed, continuing per policy",
                            index
                        );
                    }
                }
            }
        }

        // Natural completion: best-effort batch semantics mean failed steps
        // under `continue` still end the run as completed.
        self.executions
            .finalize(
                &params.execution_id,
                ExecutionStatus::Completed,
                &results,
                Some(&context),
                None,
                None,
            )
            .await?;

        tracing::info!(
            "[SequenceEngine] Execution {} completed ({} steps)",
            params.execution_id,
            results.len()
        );

        Ok(ExecutionOutcome {
            execution_id: Some(params.execution_id.clone()),
            success: true,
            results,
            context,
            error: None,
            waiting_hitl: false,
            hitl_request: None,
            hitl_position: None,
            step_index: None,
        })
    }

    /// Fire a gate and return the paused outcome immediately — resumption is
    /// a separate, externally-triggered call.
    #[allow(clippy::too_many_arguments)]
    async fn suspend(
        &self,
        sequence: &Sequence,
        step_index: usize,
        position: HitlPosition,
        config: &crate::models::hitl::HitlConfig,
        context: Value,
        results: Vec<StepResult>,
        params: &RunParams,
    ) -> Result<ExecutionOutcome, EngineError> {
        let request = self
            .gate
            .open_request(
                &params.execution_id,
                &sequence.key,
                step_index,
                position,
                config,
                &context,
                &params.mock_data,
                &params.organization_id,
                &results,
            )
            .await?;

        {
            let mut inner = self.inner.write().await;
            inner.current_hitl_request = Some(request.clone());
        }

        Ok(ExecutionOutcome {
            execution_id: Some(params.execution_id.clone()),
            success: false,
            results,
            context,
            error: None,
            waiting_hitl: true,
            hitl_request: Some(request),
            hitl_position: Some(position),
            step_index: Some(step_index),
        })
    }

    // ─── Delegated execution ──────────────────────────────────────────────

    /// Hand the whole sequence to the backend in one call and map the
    /// aggregate response back into local shapes.
    async fn run_delegated(
        &self,
        sequence: &Sequence,
        context: Value,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let call = self.skills.execute_sequence(
            &params.organization_id,
            &sequence.key,
            &context,
            params.simulation,
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                self.executions
                    .finalize(&params.execution_id, ExecutionStatus::Cancelled, &[], None, None, None)
                    .await
                    .ok();
                return ExecutionOutcome {
                    execution_id: Some(params.execution_id.clone()),
                    success: false,
                    results: Vec::new(),
                    context,
                    error: Some("Execution cancelled".to_string()),
                    waiting_hitl: false,
                    hitl_request: None,
                    hitl_position: None,
                    step_index: None,
                };
            }
            response = call => response,
        };

        match response {
            Ok(aggregate) => {
                let results: Vec<StepResult> = aggregate
                    .step_results
                    .iter()
                    .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                        Ok(result) => Some(result),
                        Err(e) => {
                            tracing::warn!(
                                "[SequenceEngine] Skipping unparseable delegated step result: {}",
                                e
                            );
                            None
                        }
                    })
                    .collect();
                let final_context = aggregate.final_output.clone().unwrap_or(context);

                let failed = aggregate.status == "failed" || aggregate.error.is_some();
                if failed {
                    // Errors of unknown shape never reach callers un-coerced.
                    let message = aggregate
                        .error
                        .as_ref()
                        .map(coerce_error_message)
                        .unwrap_or_else(|| "Delegated execution failed".to_string());
                    self.executions
                        .finalize(
                            &params.execution_id,
                            ExecutionStatus::Failed,
                            &results,
                            None,
                            Some(&message),
                            None,
                        )
                        .await
                        .ok();
                    ExecutionOutcome {
                        execution_id: Some(params.execution_id.clone()),
                        success: false,
                        results,
                        context: final_context,
                        error: Some(message),
                        waiting_hitl: false,
                        hitl_request: None,
                        hitl_position: None,
                        step_index: None,
                    }
                } else {
                    self.executions
                        .finalize(
                            &params.execution_id,
                            ExecutionStatus::Completed,
                            &results,
                            Some(&final_context),
                            None,
                            None,
                        )
                        .await
                        .ok();
                    ExecutionOutcome {
                        execution_id: Some(params.execution_id.clone()),
                        success: true,
                        results,
                        context: final_context,
                        error: None,
                        waiting_hitl: false,
                        hitl_request: None,
                        hitl_position: None,
                        step_index: None,
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.executions
                    .finalize(
                        &params.execution_id,
                        ExecutionStatus::Failed,
                        &[],
                        None,
                        Some(&message),
                        None,
                    )
                    .await
                    .ok();
                ExecutionOutcome::failed(Some(params.execution_id.clone()), json!({}), message)
            }
        }
    }
}
