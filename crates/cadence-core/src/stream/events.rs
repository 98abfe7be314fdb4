//! SSE frame assembly and the copilot event vocabulary.
//!
//! The autonomous-execution endpoint answers with a `text/event-stream`
//! body. Frames arrive as `event:`/`data:` line pairs terminated by a blank
//! line; chunks from the network can split lines anywhere, so the parser
//! buffers partial lines across pushes. A JSON parse failure on one frame
//! skips that frame and never aborts the stream.

use serde_json::Value;

/// One assembled `event:`/`data:` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE parser. Feed raw chunks with `push`; call `finish` at
/// end-of-stream to flush a frame missing its trailing blank line.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.accept_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush any half-dispatched frame at end of stream.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(frame) = self.accept_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event_name = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines.push(data.trim_start().to_string());
        }
        // Comment lines (":keepalive") and unknown fields are ignored.
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data_lines.is_empty() && self.event_name.is_none() {
            return None;
        }
        let event = self.event_name.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Typed copilot event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text
    Token { text: String },
    /// A tool/step began executing
    ToolCallStart {
        id: String,
        name: String,
        input: Option<Value>,
    },
    /// A tool/step finished (matched to its start by id)
    ToolCallResult {
        id: String,
        result: Option<Value>,
        error: Option<String>,
        /// Resource kind the tool upserted, if any (drives targeted cache
        /// invalidation downstream)
        resource: Option<String>,
    },
    /// A sub-agent started working
    AgentStart {
        name: String,
        display_name: Option<String>,
    },
    /// A sub-agent finished
    AgentDone { name: String },
    /// Structured side-channel payload for the current message
    Structured { payload: Value },
    /// Stream completed normally
    Done { text: Option<String> },
    /// Stream-level error
    Error { message: String },
}

impl StreamEvent {
    /// Parse one assembled frame. `None` means the frame is malformed or
    /// unrecognized and should be skipped.
    pub fn parse(frame: &SseFrame) -> Option<Self> {
        let data: Value = serde_json::from_str(&frame.data).ok()?;

        // Frames without an explicit event name carry their kind in the
        // payload's "type" field.
        let kind = if frame.event == "message" {
            data.get("type").and_then(|t| t.as_str())?.to_string()
        } else {
            frame.event.clone()
        };

        match kind.as_str() {
            "token" => Some(Self::Token {
                text: data.get("text").and_then(|t| t.as_str())?.to_string(),
            }),
            "tool_call_start" => Some(Self::ToolCallStart {
                id: data.get("id").and_then(|v| v.as_str())?.to_string(),
                name: data
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("tool")
                    .to_string(),
                input: data.get("input").cloned(),
            }),
            "tool_call_result" => Some(Self::ToolCallResult {
                id: data.get("id").and_then(|v| v.as_str())?.to_string(),
                result: data.get("result").cloned().filter(|v| !v.is_null()),
                error: data
                    .get("error")
                    .filter(|v| !v.is_null())
                    .map(crate::error::coerce_error_message),
                resource: data
                    .get("resource")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            }),
            "agent_start" => Some(Self::AgentStart {
                name: data.get("name").and_then(|v| v.as_str())?.to_string(),
                display_name: data
                    .get("displayName")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            }),
            "agent_done" => Some(Self::AgentDone {
                name: data.get("name").and_then(|v| v.as_str())?.to_string(),
            }),
            "structured" => Some(Self::Structured {
                payload: data.get("payload").cloned().unwrap_or(data),
            }),
            "done" => Some(Self::Done {
                text: data.get("text").and_then(|t| t.as_str()).map(String::from),
            }),
            "error" => Some(Self::Error {
                message: data
                    .get("message")
                    .map(crate::error::coerce_error_message)
                    .unwrap_or_else(|| crate::error::coerce_error_message(&data)),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        // Split mid-line and mid-frame
        let frames = parser.push(b"event: tok");
        assert!(frames.is_empty());
        let frames = parser.push(b"en\ndata: {\"text\": \"He");
        assert!(frames.is_empty());
        let frames = parser.push(b"llo\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[0].data, r#"{"text": "Hello"}"#);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.push(
            b"event: token\ndata: {\"text\":\"a\"}\n\nevent: done\ndata: {}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[1].event, "done");
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut parser = SseParser::new();
        // Stream ends without the terminating blank line
        assert!(parser.push(b"event: token\ndata: {\"text\":\"tail\"}").is_empty());
        let frame = parser.finish().unwrap();
        assert_eq!(frame.event, "token");
    }

    #[test]
    fn test_comment_lines_ignored() {
        let mut parser = SseParser::new();
        let frames = parser.push(b":keepalive\n\nevent: done\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "done");
    }

    #[test]
    fn test_parse_failure_is_skippable() {
        let frame = SseFrame {
            event: "token".to_string(),
            data: "{not json".to_string(),
        };
        assert_eq!(StreamEvent::parse(&frame), None);
    }

    #[test]
    fn test_type_field_fallback() {
        let frame = SseFrame {
            event: "message".to_string(),
            data: r#"{"type":"token","text":"hi"}"#.to_string(),
        };
        assert_eq!(
            StreamEvent::parse(&frame),
            Some(StreamEvent::Token { text: "hi".to_string() })
        );
    }

    #[test]
    fn test_tool_result_error_coercion() {
        let frame = SseFrame {
            event: "tool_call_result".to_string(),
            data: r#"{"id":"t1","error":{"message":"rate limited"}}"#.to_string(),
        };
        match StreamEvent::parse(&frame) {
            Some(StreamEvent::ToolCallResult { error, .. }) => {
                assert_eq!(error.as_deref(), Some("rate limited"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
