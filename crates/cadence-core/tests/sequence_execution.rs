//! Integration tests for the sequence engine.
//!
//! These drive the real engine against an in-memory SQLite database, with
//! wiremock standing in for the execution backend where live mode is
//! exercised.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cadence_core::engine::ExecuteOptions;
use cadence_core::models::execution::{ExecutionStatus, StepStatus};
use cadence_core::models::sequence::Sequence;
use cadence_core::{Database, EngineStateInner, RemoteConfig};

fn test_state(base_url: &str) -> EngineStateInner {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    EngineStateInner::new(db, RemoteConfig::with_base_url(base_url))
}

fn simulation_options() -> ExecuteOptions {
    let mut options = ExecuteOptions::new("user-1", "org-1");
    options.simulation = true;
    options
}

#[tokio::test]
async fn test_missing_user_fails_before_any_persistence() {
    let state = test_state("http://127.0.0.1:1");
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "noop"
name: "Noop"
steps:
  - order: 1
    action: "create_lead"
"#,
    )
    .unwrap();

    let result = engine
        .execute(&sequence, ExecuteOptions::new("", "org-1"))
        .await;
    assert!(result.is_err());

    // No execution row was created
    let rows = state.execution_store.list_recent("org-1", 10).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_simulation_runs_steps_strictly_in_order() {
    let state = test_state("http://127.0.0.1:1");
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "ordered"
name: "Ordered"
steps:
  - order: 3
    action: "create_task"
    output_key: "task"
  - order: 1
    action: "enrich_company"
    output_key: "company"
  - order: 2
    action: "create_lead"
    output_key: "lead"
"#,
    )
    .unwrap();

    let outcome = engine.execute(&sequence, simulation_options()).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 3);

    // Results follow `order`, not declaration order
    assert_eq!(outcome.results[0].skill_key, "enrich_company");
    assert_eq!(outcome.results[1].skill_key, "create_lead");
    assert_eq!(outcome.results[2].skill_key, "create_task");

    // Step j never starts before step i completed (i < j)
    for pair in outcome.results.windows(2) {
        let earlier_done = pair[0].completed_at.unwrap();
        assert!(pair[1].started_at >= earlier_done);
    }

    // Outputs accumulated under their keys
    assert!(outcome.context["outputs"]["company"].is_object());
    assert!(outcome.context["outputs"]["lead"].is_object());
    assert!(outcome.context["outputs"]["task"].is_object());

    // Terminal state persisted
    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert!(stored.final_output.is_some());
}

#[tokio::test]
async fn test_step_output_feeds_next_step_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .and(body_partial_json(json!({"skill_key": "step_a"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"foo": 42}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .and(body_partial_json(json!({"skill_key": "step_b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"echoed": true}
        })))
        .mount(&server)
        .await;

    let state = test_state(&server.uri());
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "chained"
name: "Chained"
steps:
  - order: 1
    skill_key: "step_a"
    output_key: "x"
  - order: 2
    skill_key: "step_b"
    input_mapping:
      val: "${outputs.x.foo}"
"#,
    )
    .unwrap();

    let outcome = engine
        .execute(&sequence, ExecuteOptions::new("user-1", "org-1"))
        .await
        .unwrap();

    assert!(outcome.success, "outcome error: {:?}", outcome.error);
    assert_eq!(outcome.results[1].input, json!({"val": 42}));
}

#[tokio::test]
async fn test_on_failure_stop_halts_sequence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .and(body_partial_json(json!({"skill_key": "flaky"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": {"message": "upstream rejected"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"ok": true}
        })))
        .mount(&server)
        .await;

    let state = test_state(&server.uri());
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "stops"
name: "Stops"
steps:
  - order: 1
    skill_key: "solid"
  - order: 2
    skill_key: "flaky"
    on_failure: stop
  - order: 3
    skill_key: "solid"
"#,
    )
    .unwrap();

    let outcome = engine
        .execute(&sequence, ExecuteOptions::new("user-1", "org-1"))
        .await
        .unwrap();

    // Exactly two results recorded; step 3 never ran
    assert!(!outcome.success);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[1].status, StepStatus::Failed);
    assert!(outcome.error.as_ref().unwrap().contains("upstream rejected"));

    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(stored.failed_step_index, Some(1));
}

#[tokio::test]
async fn test_on_failure_continue_completes_with_failed_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .and(body_partial_json(json!({"skill_key": "flaky"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": "upstream rejected"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/skills/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"ok": true}
        })))
        .mount(&server)
        .await;

    let state = test_state(&server.uri());
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "continues"
name: "Continues"
steps:
  - order: 1
    skill_key: "solid"
  - order: 2
    skill_key: "flaky"
    on_failure: continue
  - order: 3
    skill_key: "solid"
"#,
    )
    .unwrap();

    let outcome = engine
        .execute(&sequence, ExecuteOptions::new("user-1", "org-1"))
        .await
        .unwrap();

    // Best-effort batch: the run completes even though step 2 failed
    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.results[0].status, StepStatus::Completed);
    assert_eq!(outcome.results[1].status, StepStatus::Failed);
    assert_eq!(outcome.results[2].status, StepStatus::Completed);

    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_hitl_pause_and_resume_round_trip() {
    let state = test_state("http://127.0.0.1:1");
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "gated"
name: "Gated"
steps:
  - order: 1
    action: "enrich_company"
    output_key: "company"
  - order: 2
    action: "send_email"
    input_mapping:
      to: "${lead.email}"
    hitl_before:
      enabled: true
      prompt: "Send intro email for ${outputs.company.name}?"
      options: ["approve", "reject"]
      channels: ["slack"]
      timeout_minutes: 30
"#,
    )
    .unwrap();

    let mut options = simulation_options();
    options.skip_hitl_in_simulation = false;

    let outcome = engine.execute(&sequence, options).await.unwrap();

    // Paused at the gate, before step 2 ran
    assert!(outcome.waiting_hitl);
    assert_eq!(outcome.step_index, Some(1));
    assert_eq!(outcome.results.len(), 1);
    let request = outcome.hitl_request.clone().unwrap();
    assert!(request.prompt.contains("Meridian Labs"));
    assert!(engine.current_hitl_request().await.is_some());

    // Exactly one pending request persisted, execution suspended
    let execution_id = outcome.execution_id.clone().unwrap();
    let pending = state
        .hitl_store
        .pending_for_execution(&execution_id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    let stored = state.execution_store.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::WaitingHitl);
    assert_eq!(stored.hitl_request_id.as_deref(), Some(request.id.as_str()));

    // Resume with an approval: the run continues to completion
    let resumed = engine
        .resume_after_hitl(&sequence, &request.id, json!("approve"), None)
        .await
        .unwrap();
    assert!(resumed.success, "resume error: {:?}", resumed.error);
    assert_eq!(resumed.results.len(), 2);
    assert!(!resumed.waiting_hitl);
    assert!(engine.current_hitl_request().await.is_none());

    // The human response is reachable from the context
    assert_eq!(
        resumed.context["outputs"]["send_email_hitl_response"],
        json!("approve")
    );

    // No second request was created, and the first is resolved
    let pending = state
        .hitl_store
        .pending_for_execution(&execution_id)
        .await
        .unwrap();
    assert!(pending.is_empty());

    let stored = state.execution_store.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);

    // Double-resolution is rejected outright
    let again = engine
        .resume_after_hitl(&sequence, &request.id, json!("approve"), None)
        .await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_hitl_after_gate_resumes_at_next_step() {
    let state = test_state("http://127.0.0.1:1");
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "gated-after"
name: "Gated After"
steps:
  - order: 1
    action: "create_lead"
    output_key: "lead"
    hitl_after:
      enabled: true
      prompt: "Lead ${outputs.lead.name} created — proceed?"
  - order: 2
    action: "create_task"
    output_key: "task"
"#,
    )
    .unwrap();

    let mut options = simulation_options();
    options.skip_hitl_in_simulation = false;

    let outcome = engine.execute(&sequence, options).await.unwrap();
    assert!(outcome.waiting_hitl);
    assert_eq!(outcome.step_index, Some(0));
    // Step 1 already completed when the after-gate fired
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].status, StepStatus::Completed);

    let request = outcome.hitl_request.unwrap();
    let resumed = engine
        .resume_after_hitl(&sequence, &request.id, json!("proceed"), None)
        .await
        .unwrap();

    assert!(resumed.success);
    // Step 1 was not re-run
    assert_eq!(resumed.results.len(), 2);
    assert_eq!(resumed.results[0].skill_key, "create_lead");
    assert_eq!(resumed.results[1].skill_key, "create_task");
}

#[tokio::test]
async fn test_cancellation_halts_between_steps() {
    let state = test_state("http://127.0.0.1:1");
    let engine = Arc::new(state.sequence_engine());
    let sequence = Sequence::from_yaml(
        r#"
key: "long"
name: "Long"
steps:
  - order: 1
    action: "enrich_company"
  - order: 2
    action: "create_lead"
  - order: 3
    action: "create_task"
"#,
    )
    .unwrap();

    let runner = {
        let engine = engine.clone();
        let sequence = sequence.clone();
        tokio::spawn(async move { engine.execute(&sequence, simulation_options()).await })
    };

    // Each simulated step takes at least 500ms; cancel during the first one.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    engine.cancel().await;

    let outcome = runner.await.unwrap().unwrap();
    assert!(!outcome.success);
    assert!(outcome.results.len() < 3);
    assert_eq!(outcome.error.as_deref(), Some("Execution cancelled"));

    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn test_delegated_execution_maps_aggregate_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sequences/execute"))
        .and(body_partial_json(json!({"sequence_key": "delegated"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "step_results": [
                {
                    "stepIndex": 0,
                    "skillKey": "enrich_company",
                    "status": "completed",
                    "input": {},
                    "output": {"name": "Acme"},
                    "startedAt": "2026-08-06T10:00:00Z",
                    "completedAt": "2026-08-06T10:00:01Z",
                    "durationMs": 1000
                }
            ],
            "final_output": {"outputs": {"company": {"name": "Acme"}}},
            "execution_id": "srv-123"
        })))
        .mount(&server)
        .await;

    let state = test_state(&server.uri());
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "delegated"
name: "Delegated"
steps:
  - order: 1
    skill_key: "enrich_company"
"#,
    )
    .unwrap();

    let mut options = ExecuteOptions::new("user-1", "org-1");
    options.delegate = true;

    let outcome = engine.execute(&sequence, options).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].skill_key, "enrich_company");
    assert_eq!(outcome.context["outputs"]["company"]["name"], "Acme");

    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_delegated_error_is_coerced_to_string() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sequences/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": {"code": 502, "details": {"reason": "pipeline stalled"}}
        })))
        .mount(&server)
        .await;

    let state = test_state(&server.uri());
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "delegated-err"
name: "Delegated Err"
steps:
  - order: 1
    skill_key: "anything"
"#,
    )
    .unwrap();

    let mut options = ExecuteOptions::new("user-1", "org-1");
    options.delegate = true;

    let outcome = engine.execute(&sequence, options).await.unwrap();
    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("pipeline stalled"));

    let stored = state
        .execution_store
        .get(outcome.execution_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn test_simulation_skips_gates_by_default() {
    let state = test_state("http://127.0.0.1:1");
    let engine = state.sequence_engine();
    let sequence = Sequence::from_yaml(
        r#"
key: "skip-gates"
name: "Skip Gates"
steps:
  - order: 1
    action: "send_email"
    hitl_before:
      enabled: true
      prompt: "Approve?"
"#,
    )
    .unwrap();

    let outcome = engine.execute(&sequence, simulation_options()).await.unwrap();
    assert!(outcome.success);
    assert!(!outcome.waiting_hitl);
    assert_eq!(outcome.results.len(), 1);
}
