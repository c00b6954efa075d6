//! Chat events streamed to clients over Server-Sent Events.
//!
//! The server broadcasts one `ChatEvent` per state change of a chat session.
//! On the wire, the SSE `event:` field carries [`ChatEvent::name`] and the
//! `data:` field carries the JSON-serialized event (including its tag).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EndstateError;
use crate::types::ChatMessage;

/// A chat session event, tagged by its SSE event name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Sent first on every (re)connection: the full transcript.
    InitialMessages {
        messages: Vec<ChatMessage>,
        processing: bool,
    },
    /// A user or assistant message was appended.
    MessageAdded { message: ChatMessage },
    /// The session lock was taken for a turn.
    ProcessingStarted { request_id: String },
    /// The turn finished and the lock was released.
    ProcessingComplete { request_id: String },
    /// The in-flight turn was aborted (session reset).
    ProcessingCancelled { request_id: String },
    /// The turn failed.
    Error {
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Keep-alive so clients can detect a dead connection.
    Heartbeat { timestamp: DateTime<Utc> },
}

impl ChatEvent {
    /// The SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::InitialMessages { .. } => "initial_messages",
            ChatEvent::MessageAdded { .. } => "message_added",
            ChatEvent::ProcessingStarted { .. } => "processing_started",
            ChatEvent::ProcessingComplete { .. } => "processing_complete",
            ChatEvent::ProcessingCancelled { .. } => "processing_cancelled",
            ChatEvent::Error { .. } => "error",
            ChatEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn heartbeat() -> Self {
        ChatEvent::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    /// Parse a received SSE frame. The event name wins over any tag in the data.
    pub fn from_sse(name: &str, data: &str) -> Result<Self, EndstateError> {
        let mut value: serde_json::Value = if data.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(data)?
        };
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert(
                    "event".to_string(),
                    serde_json::Value::String(name.to_string()),
                );
            }
            None => {
                return Err(EndstateError::Validation(format!(
                    "SSE data for {name} is not a JSON object"
                )))
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_name() {
        let event = ChatEvent::ProcessingStarted {
            request_id: "req-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
    }

    #[test]
    fn from_sse_uses_frame_name() {
        let msg = ChatMessage::assistant("hello", Some("req-1".to_string()));
        let data = serde_json::json!({ "message": msg }).to_string();
        let event = ChatEvent::from_sse("message_added", &data).unwrap();
        match event {
            ChatEvent::MessageAdded { message } => assert_eq!(message.content, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn from_sse_roundtrips_server_payload() {
        let event = ChatEvent::heartbeat();
        let data = serde_json::to_string(&event).unwrap();
        let parsed = ChatEvent::from_sse(event.name(), &data).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn from_sse_rejects_non_object() {
        assert!(ChatEvent::from_sse("heartbeat", "[1,2]").is_err());
        assert!(ChatEvent::from_sse("bogus", "{}").is_err());
    }
}
