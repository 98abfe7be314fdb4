//! Human-in-the-loop gate configuration and persisted requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gate configuration attached to a sequence step (`hitl_before` /
/// `hitl_after`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlConfig {
    /// Gate only fires when enabled
    #[serde(default)]
    pub enabled: bool,

    /// Prompt template; `${path}` tokens are interpolated against the
    /// accumulated execution context at gate time
    #[serde(default)]
    pub prompt: String,

    /// Choices presented to the responder (free-form response if empty)
    #[serde(default)]
    pub options: Vec<String>,

    /// Value applied when the request times out with `use_default`
    #[serde(default)]
    pub default_value: Option<Value>,

    /// Notification channels ("slack" triggers the webhook notifier)
    #[serde(default)]
    pub channels: Vec<String>,

    /// Slack channel override for the notification
    #[serde(default)]
    pub slack_channel_id: Option<String>,

    /// Minutes until the request expires
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,

    /// What the (external) expiry sweeper should do on timeout
    #[serde(default)]
    pub timeout_action: TimeoutAction,

    /// Kind of request, e.g. "approval", "choice", "input"
    #[serde(default = "default_request_type")]
    pub request_type: String,

    /// Specific user the request is routed to
    #[serde(default)]
    pub assigned_to_user_id: Option<String>,
}

fn default_timeout_minutes() -> i64 {
    60
}

fn default_request_type() -> String {
    "approval".to_string()
}

/// Action taken when a pending request passes `expires_at`. Enforcement is
/// external to the engine; the engine only records the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    #[default]
    UseDefault,
    Fail,
    Skip,
}

/// Whether a gate fired before or after its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlPosition {
    Before,
    After,
}

impl HitlPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "after" => Self::After,
            _ => Self::Before,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlRequestStatus {
    Pending,
    Resolved,
}

impl HitlRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "resolved" => Self::Resolved,
            _ => Self::Pending,
        }
    }
}

/// A persisted pause checkpoint awaiting an external response.
///
/// Carries a snapshot of the execution context at gate time so a later
/// process can resume the run without the original in-memory state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitlRequest {
    pub id: String,
    pub execution_id: String,
    pub sequence_key: String,
    pub step_index: usize,
    pub position: HitlPosition,
    /// Interpolated prompt (tokens the context couldn't resolve are left
    /// literal so template bugs stay visible)
    pub prompt: String,
    pub request_type: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
    pub status: HitlRequestStatus,
    #[serde(default)]
    pub response: Option<Value>,
    /// Execution context snapshot at gate time
    pub execution_context: Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl HitlRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: String,
        sequence_key: String,
        step_index: usize,
        position: HitlPosition,
        prompt: String,
        config: &HitlConfig,
        execution_context: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id,
            sequence_key,
            step_index,
            position,
            prompt,
            request_type: config.request_type.clone(),
            options: config.options.clone(),
            default_value: config.default_value.clone(),
            status: HitlRequestStatus::Pending,
            response: None,
            execution_context,
            expires_at: now + Duration::minutes(config.timeout_minutes.max(1)),
            created_at: now,
            resolved_at: None,
        }
    }
}
