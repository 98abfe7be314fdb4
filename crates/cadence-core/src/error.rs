//! Core error type for the Cadence engine.
//!
//! `EngineError` is used throughout the core domain (stores, engine, remote
//! clients). Step-level failures are *not* represented as errors — the step
//! executor normalizes them into `StepResult` records — so anything that
//! surfaces as `EngineError` is a sequence-level or infrastructure problem.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coerce an arbitrary error payload into a human-readable string.
///
/// Remote endpoints report errors as strings, as `{ "message": … }` objects,
/// or as arbitrary JSON. UI-facing state only ever carries strings, so the
/// coercion order is: plain string, then `.message`, then JSON serialization,
/// then `Display`. Always returns a non-empty string and never fails.
pub fn coerce_error_message(value: &serde_json::Value) -> String {
    if let Some(s) = value.as_str() {
        if !s.is_empty() {
            return s.to_string();
        }
    }
    if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
        if !msg.is_empty() {
            return msg.to_string();
        }
    }
    if let Ok(serialized) = serde_json::to_string(value) {
        if !serialized.is_empty() && serialized != "null" && serialized != "\"\"" {
            return serialized;
        }
    }
    let display = value.to_string();
    if display.is_empty() || display == "null" {
        "unknown error".to_string()
    } else {
        display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_plain_string() {
        assert_eq!(coerce_error_message(&json!("boom")), "boom");
    }

    #[test]
    fn test_coerce_message_object() {
        assert_eq!(
            coerce_error_message(&json!({"message": "skill timed out"})),
            "skill timed out"
        );
    }

    #[test]
    fn test_coerce_object_without_message() {
        let coerced = coerce_error_message(&json!({"code": 42}));
        assert!(!coerced.is_empty());
        assert!(coerced.contains("42"));
    }

    #[test]
    fn test_coerce_empty_object_and_null() {
        assert!(!coerce_error_message(&json!({})).is_empty());
        assert_eq!(coerce_error_message(&json!(null)), "unknown error");
        assert!(!coerce_error_message(&json!("")).is_empty());
    }

    #[test]
    fn test_coerce_nested_structure() {
        let deep = json!({"error": {"details": [{"reason": "denied"}]}});
        let coerced = coerce_error_message(&deep);
        assert!(coerced.contains("denied"));
    }
}
