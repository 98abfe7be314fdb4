pub mod chat;
pub mod execution;
pub mod hitl;
pub mod sequence;

pub use chat::*;
pub use execution::*;
pub use hitl::*;
pub use sequence::*;
