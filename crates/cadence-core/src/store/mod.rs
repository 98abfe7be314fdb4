pub mod execution_store;
pub mod hitl_store;
pub mod message_store;

pub use execution_store::ExecutionStore;
pub use hitl_store::HitlRequestStore;
pub use message_store::MessageStore;
