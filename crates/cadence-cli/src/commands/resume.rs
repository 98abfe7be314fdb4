//! `cadence resume` — Resolve a pending HITL request and continue the run.

use cadence_core::models::sequence::Sequence;
use cadence_core::state::EngineState;

use super::run::print_outcome;

pub async fn run(
    state: &EngineState,
    request_id: &str,
    file: &str,
    response: &str,
) -> Result<(), String> {
    let sequence = Sequence::from_file(file)?;

    // A response flag like `--response '{"approved":true}'` is JSON;
    // anything that doesn't parse is taken as a plain string.
    let response_value = serde_json::from_str(response)
        .unwrap_or_else(|_| serde_json::Value::String(response.to_string()));

    let engine = state.sequence_engine();
    let outcome = engine
        .resume_after_hitl(&sequence, request_id, response_value, None)
        .await
        .map_err(|e| e.to_string())?;

    print_outcome(&outcome);

    if outcome.success || outcome.waiting_hitl {
        Ok(())
    } else {
        Err(outcome
            .error
            .unwrap_or_else(|| "Sequence failed".to_string()))
    }
}
