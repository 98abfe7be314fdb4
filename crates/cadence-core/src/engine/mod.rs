//! Sequence execution engine: variable resolution, mock outputs, step
//! execution, HITL gates, and the orchestrating state machine.

pub mod executor;
pub mod hitl;
pub mod mock;
pub mod resolver;
pub mod step;

pub use executor::{ExecuteOptions, ExecutionOutcome, SequenceEngine};
pub use hitl::HitlGate;
pub use step::StepExecutor;
