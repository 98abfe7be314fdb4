//! `cadence run` — Execute a YAML-defined sequence.

use cadence_core::engine::{ExecuteOptions, ExecutionOutcome};
use cadence_core::models::execution::StepStatus;
use cadence_core::models::sequence::Sequence;
use cadence_core::state::EngineState;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    state: &EngineState,
    file: &str,
    simulate: bool,
    delegate: bool,
    gates_in_simulation: bool,
    params: Vec<(String, String)>,
    user_id: &str,
    organization_id: &str,
) -> Result<(), String> {
    let sequence = Sequence::from_file(file)?;

    println!("Loaded sequence: {} ({})", sequence.name, file);
    println!(
        "   {} step(s), mode: {}",
        sequence.steps.len(),
        if simulate {
            "simulation"
        } else if delegate {
            "delegated"
        } else {
            "live"
        }
    );
    println!();

    let mut options = ExecuteOptions::new(user_id, organization_id);
    options.simulation = simulate;
    options.delegate = delegate;
    options.skip_hitl_in_simulation = !gates_in_simulation;
    options.trigger_params = params
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect::<serde_json::Map<_, _>>()
        .into();

    let engine = state.sequence_engine();
    let outcome = engine
        .execute(&sequence, options)
        .await
        .map_err(|e| e.to_string())?;

    print_outcome(&outcome);

    if outcome.waiting_hitl {
        Ok(())
    } else if outcome.success {
        Ok(())
    } else {
        Err(outcome
            .error
            .unwrap_or_else(|| "Sequence failed".to_string()))
    }
}

pub fn print_outcome(outcome: &ExecutionOutcome) {
    for result in &outcome.results {
        let marker = match result.status {
            StepStatus::Completed => "ok",
            StepStatus::Failed => "FAILED",
            _ => "…",
        };
        println!(
            "── Step {} [{}] {} ({} ms)",
            result.step_index + 1,
            result.skill_key,
            marker,
            result.duration_ms.unwrap_or(0)
        );
        if let Some(error) = &result.error {
            println!("   error: {}", error);
        }
    }
    println!();

    if outcome.waiting_hitl {
        let request = outcome.hitl_request.as_ref();
        println!("Execution paused — human input required.");
        if let Some(request) = request {
            println!("   Request : {}", request.id);
            println!("   Prompt  : {}", request.prompt);
            if !request.options.is_empty() {
                println!("   Options : {}", request.options.join(" | "));
            }
            println!("   Expires : {}", request.expires_at.to_rfc3339());
            println!();
            println!(
                "Resume with: cadence resume {} --file <sequence.yaml> --response <value>",
                request.id
            );
        }
        return;
    }

    if outcome.success {
        println!(
            "Sequence completed ({} step(s), execution {})",
            outcome.results.len(),
            outcome.execution_id.as_deref().unwrap_or("-")
        );
    } else {
        println!(
            "Sequence failed: {}",
            outcome.error.as_deref().unwrap_or("unknown")
        );
    }
}
