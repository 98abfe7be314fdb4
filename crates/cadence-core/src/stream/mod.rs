//! Streaming copilot: SSE event vocabulary, the conversation reducer, and
//! the session driver that connects them to the execution backend.

pub mod events;
pub mod reducer;
pub mod session;

pub use events::{SseFrame, SseParser, StreamEvent};
pub use reducer::{ConversationState, Effect};
pub use session::{ChatSession, StopHandle, StreamSummary};
