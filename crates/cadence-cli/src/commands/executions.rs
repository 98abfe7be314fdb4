//! `cadence executions` — Inspect persisted sequence executions.

use cadence_core::state::EngineState;

use super::print_json;

pub async fn list(state: &EngineState, organization_id: &str, limit: u32) -> Result<(), String> {
    let executions = state
        .execution_store
        .list_recent(organization_id, limit)
        .await
        .map_err(|e| e.to_string())?;

    if executions.is_empty() {
        println!("No executions for organization '{}'", organization_id);
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<14} {:<6} {}",
        "ID", "SEQUENCE", "STATUS", "STEPS", "CREATED"
    );
    for execution in executions {
        println!(
            "{:<38} {:<24} {:<14} {:<6} {}",
            execution.id,
            execution.sequence_key,
            execution.status.as_str(),
            execution.step_results.len(),
            execution.created_at.to_rfc3339(),
        );
    }
    Ok(())
}

pub async fn show(state: &EngineState, execution_id: &str) -> Result<(), String> {
    let execution = state
        .execution_store
        .get(execution_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Execution not found: {}", execution_id))?;

    let value = serde_json::to_value(&execution).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}
