//! Fire-and-forget notification channel for HITL requests.
//!
//! Notification is best-effort: the gate must never fail because a webhook
//! was unreachable, so delivery runs in a detached task and failures are
//! only observed via logging.

use serde_json::json;

use crate::config::RemoteConfig;

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            webhook_url: config.notify_webhook.clone(),
        }
    }

    /// Post a notification for a newly-created HITL request without blocking
    /// the caller. No-op when no webhook is configured.
    pub fn notify_detached(
        &self,
        request_id: &str,
        organization_id: &str,
        prompt: &str,
        channel_id: Option<&str>,
    ) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::debug!(
                "[Notifier] No webhook configured, skipping notification for request {}",
                request_id
            );
            return;
        };

        let client = self.client.clone();
        let body = json!({
            "request_id": request_id,
            "organization_id": organization_id,
            "prompt": prompt,
            "channel_id": channel_id,
        });
        let request_id = request_id.to_string();

        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("[Notifier] Notified channel for request {}", request_id);
                }
                Ok(response) => {
                    tracing::warn!(
                        "[Notifier] Webhook returned {} for request {}",
                        response.status(),
                        request_id
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "[Notifier] Failed to notify for request {}: {}",
                        request_id,
                        e
                    );
                }
            }
        });
    }
}
