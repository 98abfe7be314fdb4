//! Single-step execution: input building, mock/live branching, and
//! normalization of every outcome into a uniform `StepResult`.

use rand::Rng;
use serde_json::{Map, Value};

use crate::engine::mock::mock_output;
use crate::engine::resolver::resolve;
use crate::error::EngineError;
use crate::models::execution::StepResult;
use crate::models::sequence::SequenceStep;
use crate::remote::SkillClient;

pub struct StepExecutor {
    skills: SkillClient,
}

impl StepExecutor {
    pub fn new(skills: SkillClient) -> Self {
        Self { skills }
    }

    /// Execute one step. Never returns an error — every failure path is
    /// normalized into a `failed` step result so the orchestrator can apply
    /// the step's failure policy uniformly.
    pub async fn execute(
        &self,
        step: &SequenceStep,
        step_index: usize,
        context: &Value,
        simulation: bool,
        mock_data: &Value,
        organization_id: &str,
    ) -> StepResult {
        let input = build_input(step, context, mock_data);
        let step_key = step.step_key();
        let record = StepResult::started(step_index, step_key.clone(), input.clone());

        tracing::info!(
            "[StepExecutor] Running step {} ('{}', simulation={})",
            step_index,
            step_key,
            simulation
        );

        let outcome = if simulation {
            self.execute_mock(step, &step_key, &input, mock_data).await
        } else {
            self.execute_live(step, &input, organization_id).await
        };

        match outcome {
            Ok(output) => record.complete(output),
            Err(e) => {
                tracing::warn!(
                    "[StepExecutor] Step {} ('{}') failed: {}",
                    step_index,
                    step_key,
                    e
                );
                record.fail(e.to_string())
            }
        }
    }

    async fn execute_mock(
        &self,
        step: &SequenceStep,
        step_key: &str,
        input: &Value,
        mock_data: &Value,
    ) -> Result<Value, EngineError> {
        // Emulate backend latency so simulated runs pace like real ones.
        let delay_ms = { rand::thread_rng().gen_range(500..=1000) };
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

        let kind = step.action.as_deref().map(str::trim).filter(|a| !a.is_empty());
        Ok(mock_output(kind.unwrap_or(step_key), input, mock_data))
    }

    async fn execute_live(
        &self,
        step: &SequenceStep,
        input: &Value,
        organization_id: &str,
    ) -> Result<Value, EngineError> {
        match step.skill_key.as_deref().map(str::trim) {
            Some(skill_key) if !skill_key.is_empty() => {
                self.skills
                    .execute_skill(skill_key, input, organization_id)
                    .await
            }
            // Action-type steps are a deliberate capability gap in direct
            // mode; the backend-delegated path runs them.
            _ => Err(EngineError::Unsupported(format!(
                "Step '{}' has no skill_key; action steps are not supported in direct \
                 execution — use delegated execution",
                step.step_key()
            ))),
        }
    }
}

/// Resolve every entry of the step's input mapping against the layered
/// context. Unresolvable expressions map to null rather than being dropped,
/// so the recorded input shows every field the mapping asked for.
fn build_input(step: &SequenceStep, context: &Value, mock_data: &Value) -> Value {
    let mut input = Map::new();
    for (field, expr) in &step.input_mapping {
        let value = resolve(expr, context, mock_data).unwrap_or(Value::Null);
        input.insert(field.clone(), value);
    }
    Value::Object(input)
}
