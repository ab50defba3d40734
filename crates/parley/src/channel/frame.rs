//! Realtime wire frames.
//!
//! Every frame is a JSON object with a `type` and, for most kinds, a `data`
//! payload. `join-room` carries `roomId` at the top level instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Mode;
use crate::error::{Error, Result};

/// Kind of a [`ChannelEvent`]; the key handlers subscribe under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinRoom,
    Message,
    MessageProcessing,
    MessageResponse,
    Error,
    /// Any `type` this crate does not know.
    Unknown,
}

impl EventKind {
    /// Map a wire `type` to a known kind. Unrecognized names return `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "join-room" => Some(EventKind::JoinRoom),
            "message" => Some(EventKind::Message),
            "message-processing" => Some(EventKind::MessageProcessing),
            "message-response" => Some(EventKind::MessageResponse),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            EventKind::JoinRoom => "join-room",
            EventKind::Message => "message",
            EventKind::MessageProcessing => "message-processing",
            EventKind::MessageResponse => "message-response",
            EventKind::Error => "error",
            EventKind::Unknown => "unknown",
        }
    }
}

/// A user message relayed to a room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Processing {
    pub status: String,
}

impl Default for Processing {
    fn default() -> Self {
        Self {
            status: "processing".into(),
        }
    }
}

/// The reply broadcast to a room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorData {
    pub message: String,
}

/// A decoded realtime frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChannelEvent {
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Message {
        data: ChatRequest,
    },
    MessageProcessing {
        #[serde(default)]
        data: Processing,
    },
    MessageResponse {
        data: ChatResponse,
    },
    Error {
        data: ErrorData,
    },
    /// A frame whose `type` is not one of the above. Never sent.
    #[serde(skip)]
    Unknown { kind: String, data: Value },
}

impl ChannelEvent {
    pub fn join_room(room_id: impl Into<String>) -> Self {
        ChannelEvent::JoinRoom {
            room_id: room_id.into(),
        }
    }

    pub fn message(message: impl Into<String>, mode: Mode, room_id: impl Into<String>) -> Self {
        ChannelEvent::Message {
            data: ChatRequest {
                message: message.into(),
                mode,
                room_id: Some(room_id.into()),
            },
        }
    }

    pub fn processing() -> Self {
        ChannelEvent::MessageProcessing {
            data: Processing::default(),
        }
    }

    pub fn response(response: impl Into<String>, mode: Mode) -> Self {
        ChannelEvent::MessageResponse {
            data: ChatResponse {
                response: response.into(),
                mode: Some(mode),
                timestamp: Some(Utc::now()),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChannelEvent::Error {
            data: ErrorData {
                message: message.into(),
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::JoinRoom { .. } => EventKind::JoinRoom,
            ChannelEvent::Message { .. } => EventKind::Message,
            ChannelEvent::MessageProcessing { .. } => EventKind::MessageProcessing,
            ChannelEvent::MessageResponse { .. } => EventKind::MessageResponse,
            ChannelEvent::Error { .. } => EventKind::Error,
            ChannelEvent::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Decode one text frame.
    ///
    /// Unknown `type` values decode to [`ChannelEvent::Unknown`]; malformed
    /// JSON, a missing `type`, or a known type with the wrong payload shape
    /// is an error.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| Error::Decode(format!("invalid frame: {e}")))?;
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Err(Error::Decode("frame has no type".into()));
        };

        if EventKind::from_wire(&kind).is_none() {
            return Ok(ChannelEvent::Unknown {
                kind,
                data: value.get("data").cloned().unwrap_or(Value::Null),
            });
        }
        serde_json::from_value(value).map_err(|e| Error::Decode(format!("invalid {kind} frame: {e}")))
    }

    /// Encode for the wire. Fails for [`ChannelEvent::Unknown`].
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Decode(format!("failed to encode frame: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_has_top_level_room_id() {
        let encoded = ChannelEvent::join_room("r1").encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, json!({"type": "join-room", "roomId": "r1"}));
    }

    #[test]
    fn message_frame_shape() {
        let encoded = ChannelEvent::message("hello", Mode::Code, "r1").encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "data": {"message": "hello", "mode": "code", "roomId": "r1"}})
        );
    }

    #[test]
    fn response_decodes_with_only_text() {
        let event = ChannelEvent::decode(r#"{"type":"message-response","data":{"response":"x"}}"#)
            .unwrap();
        assert_eq!(event.kind(), EventKind::MessageResponse);
        let ChannelEvent::MessageResponse { data } = event else {
            panic!("expected a response");
        };
        assert_eq!(data.response, "x");
        assert_eq!(data.mode, None);
    }

    #[test]
    fn processing_without_data() {
        let event = ChannelEvent::decode(r#"{"type":"message-processing"}"#).unwrap();
        assert_eq!(event, ChannelEvent::processing());
    }

    #[test]
    fn unknown_type_is_kept() {
        let event = ChannelEvent::decode(r#"{"type":"typing","data":{"user":"ana"}}"#).unwrap();
        assert_eq!(
            event,
            ChannelEvent::Unknown {
                kind: "typing".into(),
                data: json!({"user": "ana"})
            }
        );
        assert!(event.encode().is_err());
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(ChannelEvent::decode("not json").is_err());
        assert!(ChannelEvent::decode(r#"{"data":{}}"#).is_err());
        assert!(ChannelEvent::decode(r#"{"type":"message-response","data":{}}"#).is_err());
    }

    #[test]
    fn bad_payload_error_names_the_frame_type() {
        let err = ChannelEvent::decode(r#"{"type":"error","data":{"code":7}}"#).unwrap_err();
        assert!(err.to_string().contains("invalid error frame"), "{err}");
    }
}
