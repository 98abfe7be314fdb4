//! Copilot chat session: drives one SSE stream at a time into the
//! conversation reducer.
//!
//! Starting a new message always cancels the prior stream first, so two
//! reducers never mutate the same message. Whatever way the read loop ends
//! (done event, error event, EOF, abort, transport failure), the active
//! message leaves the streaming state — see
//! `ConversationState::finish_stream`.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::models::chat::ChatMessage;
use crate::remote::SkillClient;
use crate::store::MessageStore;
use crate::stream::events::{SseParser, StreamEvent};
use crate::stream::reducer::{ConversationState, Effect};

/// What one `send_message` call produced.
#[derive(Debug)]
pub struct StreamSummary {
    pub message_id: String,
    pub effects: Vec<Effect>,
    pub aborted: bool,
    pub error: Option<String>,
}

/// Handle for stopping the in-flight stream from another task.
#[derive(Clone)]
pub struct StopHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Ok(token) = self.current.lock() {
            token.cancel();
        }
    }
}

pub struct ChatSession {
    skills: SkillClient,
    messages: MessageStore,
    conversation_id: String,
    organization_id: String,
    persist: bool,
    state: ConversationState,
    current_cancel: Arc<Mutex<CancellationToken>>,
}

impl ChatSession {
    pub fn new(
        skills: SkillClient,
        messages: MessageStore,
        organization_id: impl Into<String>,
        persist: bool,
    ) -> Self {
        Self {
            skills,
            messages,
            conversation_id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            persist,
            state: ConversationState::new(),
            current_cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.state.messages
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Handle usable from another task to stop the in-flight stream.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            current: self.current_cancel.clone(),
        }
    }

    /// Stop the in-flight stream, if any. Content produced so far is kept
    /// and suffixed with a stoppage marker.
    pub fn stop_generation(&self) {
        self.stop_handle().stop();
    }

    /// Clear the in-memory conversation and, when persistence is on, the
    /// stored history (best-effort).
    pub fn clear_messages(&mut self) {
        self.state.clear();
        if self.persist {
            let store = self.messages.clone();
            let conversation_id = self.conversation_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.delete_conversation(&conversation_id).await {
                    tracing::warn!("[ChatSession] Failed to clear stored history: {}", e);
                }
            });
        }
    }

    /// Send a message and reduce the response stream to completion.
    ///
    /// Failures are normalized into the conversation view (a readable error
    /// message replaces the assistant content) rather than thrown, matching
    /// how every other terminal path renders.
    pub async fn send_message(&mut self, text: &str, context: Value) -> StreamSummary {
        // One active stream per session: cancel any prior one first.
        let cancel = CancellationToken::new();
        if let Ok(mut current) = self.current_cancel.lock() {
            current.cancel();
            *current = cancel.clone();
        }

        let message_id = self.state.begin_turn(text);
        self.persist_detached(self.state.messages[self.state.messages.len() - 2].clone());

        let response = match self
            .skills
            .chat_stream(text, &self.organization_id, &context, None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                let effects = self.state.apply(StreamEvent::Error {
                    message: message.clone(),
                });
                self.state.finish_stream(false);
                self.persist_final();
                return StreamSummary {
                    message_id,
                    effects,
                    aborted: false,
                    error: Some(message),
                };
            }
        };

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut effects: Vec<Effect> = Vec::new();
        let mut aborted = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    aborted = true;
                    break;
                }
                chunk = stream.next() => {
                    match chunk {
                        None => break,
                        Some(Err(e)) => {
                            tracing::warn!("[ChatSession] Stream read failed: {}", e);
                            break;
                        }
                        Some(Ok(bytes)) => {
                            for frame in parser.push(&bytes) {
                                match StreamEvent::parse(&frame) {
                                    Some(event) => effects.extend(self.state.apply(event)),
                                    // One malformed frame never aborts the stream
                                    None => tracing::debug!(
                                        "[ChatSession] Skipping malformed frame '{}'",
                                        frame.event
                                    ),
                                }
                            }
                        }
                    }
                }
            }
        }

        if !aborted {
            if let Some(frame) = parser.finish() {
                if let Some(event) = StreamEvent::parse(&frame) {
                    effects.extend(self.state.apply(event));
                }
            }
        }

        self.state.finish_stream(aborted);
        self.persist_final();

        for effect in &effects {
            if let Effect::ResourceTouched { resource } = effect {
                tracing::info!("[ChatSession] Tool touched '{}', cached views are stale", resource);
            }
        }

        StreamSummary {
            message_id,
            effects,
            aborted,
            error: self.state.error.clone(),
        }
    }

    /// Persist the finalized assistant message, best-effort and detached.
    fn persist_final(&self) {
        let Some(message) = self.state.current_message() else {
            return;
        };
        if message.content.is_empty() {
            return;
        }
        self.persist_detached(message.clone());
    }

    fn persist_detached(&self, message: ChatMessage) {
        if !self.persist {
            return;
        }
        let store = self.messages.clone();
        let conversation_id = self.conversation_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save(&conversation_id, &message).await {
                tracing::warn!("[ChatSession] Failed to persist message: {}", e);
            }
        });
    }
}
