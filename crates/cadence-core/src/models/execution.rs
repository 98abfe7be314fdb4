//! Persisted execution records and the accumulating execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Overall execution lifecycle. One-directional except
/// `waiting_hitl → running` on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    WaitingHitl,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::WaitingHitl => "waiting_hitl",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "waiting_hitl" => Self::WaitingHitl,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    WaitingHitl,
}

/// Uniform record of one step execution. Finalized exactly once to
/// `completed` or `failed` (or suspended to `waiting_hitl`); exactly one of
/// `output` / `error` is set on a finalized record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_index: usize,
    pub skill_key: String,
    pub status: StepStatus,
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub hitl_request_id: Option<String>,
}

impl StepResult {
    /// A record in the `running` state, created when the step starts.
    pub fn started(step_index: usize, skill_key: String, input: Value) -> Self {
        Self {
            step_index,
            skill_key,
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            hitl_request_id: None,
        }
    }

    /// Finalize as completed with the captured output.
    pub fn complete(mut self, output: Value) -> Self {
        let now = Utc::now();
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.completed_at = Some(now);
        self
    }

    /// Finalize as failed with the captured error message.
    pub fn fail(mut self, error: String) -> Self {
        let now = Utc::now();
        self.status = StepStatus::Failed;
        self.output = None;
        self.error = Some(error);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.completed_at = Some(now);
        self
    }
}

/// One persisted run of a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceExecution {
    pub id: String,
    pub sequence_key: String,
    pub organization_id: String,
    pub user_id: String,
    pub status: ExecutionStatus,
    pub input_context: Value,
    pub is_simulation: bool,
    #[serde(default)]
    pub mock_data_used: Option<Value>,
    pub step_results: Vec<StepResult>,
    #[serde(default)]
    pub final_output: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub failed_step_index: Option<usize>,
    #[serde(default)]
    pub hitl_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SequenceExecution {
    pub fn new(
        sequence_key: String,
        organization_id: String,
        user_id: String,
        input_context: Value,
        is_simulation: bool,
        mock_data_used: Option<Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_key,
            organization_id,
            user_id,
            status: ExecutionStatus::Running,
            input_context,
            is_simulation,
            mock_data_used,
            step_results: Vec::new(),
            final_output: None,
            error_message: None,
            failed_step_index: None,
            hitl_request_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Build the initial execution context:
/// `{ "trigger": { "params": … }, "outputs": {} }`.
pub fn new_context(trigger_params: Value) -> Value {
    json!({
        "trigger": { "params": trigger_params },
        "outputs": {}
    })
}

/// Merge a step output into `outputs[key]`. The context only ever grows
/// during a run; existing keys are overwritten last-write-wins.
pub fn merge_output(context: &mut Value, key: &str, output: Value) {
    if !context.is_object() {
        *context = json!({ "trigger": { "params": {} }, "outputs": {} });
    }
    if let Some(map) = context.as_object_mut() {
        let outputs = map.entry("outputs").or_insert_with(|| json!({}));
        if !outputs.is_object() {
            *outputs = json!({});
        }
        if let Some(outputs) = outputs.as_object_mut() {
            outputs.insert(key.to_string(), output);
        }
    }
}
