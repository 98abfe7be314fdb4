//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses the
//! cadence-core domain logic through `EngineState`.

pub mod chat;
pub mod executions;
pub mod resume;
pub mod run;

use std::sync::Arc;

use cadence_core::state::EngineState;
use cadence_core::RemoteConfig;

/// Initialize a shared `EngineState` from the given SQLite database path.
pub fn init_state(db_path: &str) -> EngineState {
    let db = cadence_core::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });

    Arc::new(cadence_core::EngineStateInner::new(
        db,
        RemoteConfig::from_env(),
    ))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
