//! Cadence Core — transport-agnostic engine for sequence execution and the
//! streaming copilot.
//!
//! This crate contains the data models, stores, execution engine, and
//! stream reducer. It has no HTTP server dependency, making it suitable
//! for use in:
//!
//! - CLI tools (via `cadence-cli`)
//! - HTTP backends embedding the engine
//! - Tests driving the engine against an in-memory database

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod remote;
pub mod state;
pub mod store;
pub mod stream;

// Convenience re-exports
pub use config::RemoteConfig;
pub use db::Database;
pub use error::EngineError;
pub use state::{EngineState, EngineStateInner};
