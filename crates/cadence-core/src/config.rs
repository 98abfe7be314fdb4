//! Runtime configuration for remote endpoints and notifications.
//!
//! Everything is env-driven with sensible defaults, so the CLI and tests can
//! override per-process without a config file:
//!
//! - `CADENCE_API_BASE` — base URL of the execution backend
//! - `CADENCE_API_TOKEN` — bearer token for the execution backend
//! - `CADENCE_NOTIFY_WEBHOOK` — optional webhook URL for HITL notifications

/// Configuration for the remote execution backend and notification channel.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the skill/sequence execution API.
    pub base_url: String,
    /// Bearer token sent on every request (may be empty for local backends).
    pub api_token: String,
    /// Webhook URL for HITL notifications; `None` disables notification.
    pub notify_webhook: Option<String>,
}

impl RemoteConfig {
    /// Build a config from environment variables, falling back to a local
    /// development backend.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CADENCE_API_BASE")
                .unwrap_or_else(|_| "http://127.0.0.1:8787".to_string()),
            api_token: std::env::var("CADENCE_API_TOKEN").unwrap_or_default(),
            notify_webhook: std::env::var("CADENCE_NOTIFY_WEBHOOK").ok(),
        }
    }

    /// Config pointing at an explicit base URL (used by tests and embedders).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: String::new(),
            notify_webhook: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
