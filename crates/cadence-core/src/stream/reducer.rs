//! Event reducer: folds the copilot event stream into a single mutable
//! conversation view.
//!
//! Side effects (tool lifecycle, cache invalidation, completion,
//! persistence) are returned as values for the driver to interpret rather
//! than fired from inside the fold — every handler therefore observes the
//! current message through the reducer's own state, never a captured
//! identifier.

use chrono::Utc;

use crate::models::chat::{
    ActiveAgent, AgentActivity, ChatMessage, ToolCall, ToolCallStatus,
};
use crate::stream::events::StreamEvent;

/// Content shown when a stream ends without producing any text.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No response was generated.";

/// Marker appended when the user stops generation mid-stream.
pub const STOPPED_MARKER: &str = "\n\n_(generation stopped)_";

/// Side effects requested by the reducer, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ToolStarted { name: String },
    ToolFinished { name: String, ok: bool },
    /// A tool upserted a tracked resource; cached views of it are stale
    ResourceTouched { resource: String },
    Completed { text: String, tools_used: Vec<String> },
    Errored { message: String },
}

/// The conversation/execution view a stream folds into.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub active_agents: Vec<ActiveAgent>,
    pub error: Option<String>,
    current_message_id: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a turn: append the user message and an empty streaming
    /// assistant message the events fold into. Returns the assistant id.
    pub fn begin_turn(&mut self, user_text: &str) -> String {
        self.error = None;
        self.active_agents.clear();
        self.messages.push(ChatMessage::user(user_text));

        let assistant = ChatMessage::assistant_streaming();
        let id = assistant.id.clone();
        self.messages.push(assistant);
        self.current_message_id = Some(id.clone());
        id
    }

    /// Fold one event into the view.
    pub fn apply(&mut self, event: StreamEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            StreamEvent::Token { text } => {
                if let Some(message) = self.current_message_mut() {
                    message.content.push_str(&text);
                }
            }
            StreamEvent::ToolCallStart { id, name, input } => {
                if let Some(message) = self.current_message_mut() {
                    message.tool_calls.push(ToolCall {
                        id,
                        name: name.clone(),
                        input,
                        status: ToolCallStatus::Running,
                        result: None,
                        error: None,
                        started_at: Utc::now(),
                        completed_at: None,
                    });
                }
                effects.push(Effect::ToolStarted { name });
            }
            StreamEvent::ToolCallResult {
                id,
                result,
                error,
                resource,
            } => {
                let mut finished: Option<(String, bool)> = None;
                if let Some(message) = self.current_message_mut() {
                    if let Some(call) = message.tool_calls.iter_mut().find(|c| c.id == id) {
                        let ok = error.is_none();
                        call.status = if ok {
                            ToolCallStatus::Completed
                        } else {
                            ToolCallStatus::Error
                        };
                        call.result = result;
                        call.error = error;
                        call.completed_at = Some(Utc::now());
                        finished = Some((call.name.clone(), ok));
                    }
                }
                if let Some((name, ok)) = finished {
                    effects.push(Effect::ToolFinished { name, ok });
                    if let Some(resource) = resource {
                        effects.push(Effect::ResourceTouched { resource });
                    }
                }
            }
            StreamEvent::AgentStart { name, display_name } => {
                // Deduplicated by name
                match self.active_agents.iter_mut().find(|a| a.name == name) {
                    Some(agent) => agent.status = AgentActivity::Working,
                    None => self.active_agents.push(ActiveAgent {
                        display_name: display_name.unwrap_or_else(|| name.clone()),
                        name,
                        status: AgentActivity::Working,
                    }),
                }
            }
            StreamEvent::AgentDone { name } => {
                if let Some(agent) = self.active_agents.iter_mut().find(|a| a.name == name) {
                    agent.status = AgentActivity::Done;
                }
            }
            StreamEvent::Structured { payload } => {
                if let Some(message) = self.current_message_mut() {
                    message.structured_response = Some(payload);
                }
            }
            StreamEvent::Done { text } => {
                if let Some(message) = self.current_message_mut() {
                    if message.content.is_empty() {
                        if let Some(text) = text {
                            message.content = text;
                        }
                    }
                    message.is_streaming = false;
                    let tools_used = message
                        .tool_calls
                        .iter()
                        .map(|c| c.name.clone())
                        .collect();
                    effects.push(Effect::Completed {
                        text: message.content.clone(),
                        tools_used,
                    });
                }
            }
            StreamEvent::Error { message: error } => {
                self.error = Some(error.clone());
                if let Some(message) = self.current_message_mut() {
                    message.content = format!("Something went wrong: {}", error);
                    message.is_streaming = false;
                }
                effects.push(Effect::Errored { message: error });
            }
        }
        effects
    }

    /// Terminal-flag guarantee: however the read loop ended, the active
    /// message stops streaming and never stays empty. An abort preserves the
    /// partial content with a stoppage marker instead of discarding it.
    pub fn finish_stream(&mut self, aborted: bool) {
        if let Some(message) = self.current_message_mut() {
            if !message.is_streaming {
                // Already finalized by a done/error event; nothing to force.
            } else if aborted {
                if message.content.is_empty() {
                    message.content = "Generation stopped.".to_string();
                } else {
                    message.content.push_str(STOPPED_MARKER);
                }
            } else if message.content.is_empty() {
                message.content = EMPTY_RESPONSE_PLACEHOLDER.to_string();
            }
            message.is_streaming = false;
        }
        // Agents still marked working are finished by construction once the
        // stream closes.
        for agent in &mut self.active_agents {
            agent.status = AgentActivity::Done;
        }
    }

    /// The assistant message the current stream folds into.
    pub fn current_message(&self) -> Option<&ChatMessage> {
        let id = self.current_message_id.as_deref()?;
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.active_agents.clear();
        self.error = None;
        self.current_message_id = None;
    }

    fn current_message_mut(&mut self) -> Option<&mut ChatMessage> {
        let id = self.current_message_id.clone()?;
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_tokens_accumulate() {
        let mut state = ConversationState::new();
        state.begin_turn("hi");
        state.apply(token("Hel"));
        state.apply(token("lo"));
        assert_eq!(state.current_message().unwrap().content, "Hello");
        assert!(state.current_message().unwrap().is_streaming);
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let mut state = ConversationState::new();
        state.begin_turn("create a task");

        let effects = state.apply(StreamEvent::ToolCallStart {
            id: "t1".to_string(),
            name: "create_task".to_string(),
            input: Some(json!({"title": "follow up"})),
        });
        assert_eq!(
            effects,
            vec![Effect::ToolStarted {
                name: "create_task".to_string()
            }]
        );

        let effects = state.apply(StreamEvent::ToolCallResult {
            id: "t1".to_string(),
            result: Some(json!({"task_id": "task_9"})),
            error: None,
            resource: Some("tasks".to_string()),
        });
        assert_eq!(effects.len(), 2);
        assert_eq!(
            effects[1],
            Effect::ResourceTouched {
                resource: "tasks".to_string()
            }
        );

        let call = &state.current_message().unwrap().tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert!(call.completed_at.is_some());
    }

    #[test]
    fn test_tool_error_transition() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(StreamEvent::ToolCallStart {
            id: "t1".to_string(),
            name: "send_email".to_string(),
            input: None,
        });
        let effects = state.apply(StreamEvent::ToolCallResult {
            id: "t1".to_string(),
            result: None,
            error: Some("mailbox full".to_string()),
            resource: None,
        });
        assert_eq!(
            effects,
            vec![Effect::ToolFinished {
                name: "send_email".to_string(),
                ok: false
            }]
        );
        let call = &state.current_message().unwrap().tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("mailbox full"));
    }

    #[test]
    fn test_agents_deduplicated_by_name() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(StreamEvent::AgentStart {
            name: "researcher".to_string(),
            display_name: Some("Researcher".to_string()),
        });
        state.apply(StreamEvent::AgentStart {
            name: "researcher".to_string(),
            display_name: None,
        });
        assert_eq!(state.active_agents.len(), 1);

        state.apply(StreamEvent::AgentDone {
            name: "researcher".to_string(),
        });
        assert_eq!(state.active_agents[0].status, AgentActivity::Done);
    }

    #[test]
    fn test_structured_payload_is_side_channel() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(token("visible"));
        state.apply(StreamEvent::Structured {
            payload: json!({"cards": [1, 2]}),
        });
        let message = state.current_message().unwrap();
        assert_eq!(message.content, "visible");
        assert_eq!(message.structured_response, Some(json!({"cards": [1, 2]})));
    }

    #[test]
    fn test_done_reports_text_and_tools() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(StreamEvent::ToolCallStart {
            id: "t1".to_string(),
            name: "enrich_company".to_string(),
            input: None,
        });
        state.apply(token("done."));
        let effects = state.apply(StreamEvent::Done { text: None });
        assert_eq!(
            effects,
            vec![Effect::Completed {
                text: "done.".to_string(),
                tools_used: vec!["enrich_company".to_string()],
            }]
        );
        assert!(!state.current_message().unwrap().is_streaming);
    }

    #[test]
    fn test_error_replaces_content() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(token("partial"));
        state.apply(StreamEvent::Error {
            message: "backend unavailable".to_string(),
        });
        let message = state.current_message().unwrap();
        assert!(message.content.contains("backend unavailable"));
        assert!(!message.is_streaming);
        assert_eq!(state.error.as_deref(), Some("backend unavailable"));
    }

    #[test]
    fn test_finish_stream_forces_terminal_flag() {
        // Stream dies mid-message with no done event
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(token("half a thou"));
        state.finish_stream(false);

        let message = state.current_message().unwrap();
        assert!(!message.is_streaming);
        assert_eq!(message.content, "half a thou");

        // And with no content at all, a placeholder appears
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.finish_stream(false);
        let message = state.current_message().unwrap();
        assert!(!message.is_streaming);
        assert_eq!(message.content, EMPTY_RESPONSE_PLACEHOLDER);
    }

    #[test]
    fn test_abort_preserves_content_with_marker() {
        let mut state = ConversationState::new();
        state.begin_turn("x");
        state.apply(token("keep this"));
        state.finish_stream(true);
        let message = state.current_message().unwrap();
        assert!(message.content.starts_with("keep this"));
        assert!(message.content.ends_with(STOPPED_MARKER));
        assert!(!message.is_streaming);
    }
}
