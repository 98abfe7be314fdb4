//! Skill execution client — invokes the execution backend via HTTP.
//!
//! Three endpoints are consumed:
//!
//! - `POST {base}/skills/execute` — run one named skill synchronously
//! - `POST {base}/sequences/execute` — delegated execution of a whole
//!   sequence in a single backend call
//! - `POST {base}/copilot/stream` — autonomous copilot run, answered as a
//!   `text/event-stream` body

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::RemoteConfig;
use crate::error::{coerce_error_message, EngineError};

/// Aggregate response of a delegated sequence run.
#[derive(Debug, Clone, Deserialize)]
pub struct DelegatedResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub step_results: Vec<Value>,
    #[serde(default)]
    pub final_output: Option<Value>,
    #[serde(default)]
    pub execution_id: Option<String>,
    /// Unknown shape on purpose; callers coerce via `coerce_error_message`
    #[serde(default)]
    pub error: Option<Value>,
}

/// Calls the Cadence execution backend via HTTP.
#[derive(Clone)]
pub struct SkillClient {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl SkillClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_token.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.config.api_token))
        }
    }

    /// Execute one named skill. A `status: "failed"` response or a transport
    /// error surfaces as `EngineError::Remote`; `partial` results are
    /// returned as data.
    pub async fn execute_skill(
        &self,
        skill_key: &str,
        context: &Value,
        organization_id: &str,
    ) -> Result<Value, EngineError> {
        let url = self.endpoint("skills/execute");
        let body = json!({
            "skill_key": skill_key,
            "context": context,
            "organization_id": organization_id,
        });

        tracing::info!("[SkillClient] Executing skill '{}' via {}", skill_key, url);

        let response = self
            .authorize(self.client.post(&url))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Remote(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| EngineError::Remote(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(EngineError::Remote(format!(
                "Skill endpoint returned {}: {}",
                status, response_text
            )));
        }

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| EngineError::Remote(format!("Failed to parse response JSON: {}", e)))?;

        match parsed.get("status").and_then(|s| s.as_str()) {
            Some("failed") => {
                let message = parsed
                    .get("error")
                    .map(coerce_error_message)
                    .unwrap_or_else(|| format!("Skill '{}' failed", skill_key));
                Err(EngineError::Remote(message))
            }
            _ => Ok(parsed.get("data").cloned().unwrap_or(Value::Null)),
        }
    }

    /// Hand a whole sequence to the backend in one call.
    pub async fn execute_sequence(
        &self,
        organization_id: &str,
        sequence_key: &str,
        sequence_context: &Value,
        is_simulation: bool,
    ) -> Result<DelegatedResponse, EngineError> {
        let url = self.endpoint("sequences/execute");
        let body = json!({
            "organization_id": organization_id,
            "sequence_key": sequence_key,
            "sequence_context": sequence_context,
            "is_simulation": is_simulation,
        });

        tracing::info!(
            "[SkillClient] Delegating sequence '{}' via {}",
            sequence_key,
            url
        );

        let response = self
            .authorize(self.client.post(&url))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Remote(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| EngineError::Remote(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(EngineError::Remote(format!(
                "Sequence endpoint returned {}: {}",
                status, response_text
            )));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| EngineError::Remote(format!("Failed to parse response JSON: {}", e)))
    }

    /// Open the copilot event stream; the caller consumes the response body
    /// chunk-by-chunk.
    pub async fn chat_stream(
        &self,
        message: &str,
        organization_id: &str,
        context: &Value,
        routing_context: Option<&Value>,
    ) -> Result<reqwest::Response, EngineError> {
        let url = self.endpoint("copilot/stream");
        let mut body = json!({
            "message": message,
            "organizationId": organization_id,
            "context": context,
            "stream": true,
        });
        if let Some(routing) = routing_context {
            body["routingContext"] = routing.clone();
        }

        tracing::info!("[SkillClient] Opening copilot stream via {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .header("accept", "text/event-stream")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Remote(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Remote(format!(
                "Copilot endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}
