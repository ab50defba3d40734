//! REST API endpoint handlers.
//!
//! `POST /api/chat` runs one turn with request/response semantics for
//! clients that do not hold a WebSocket open.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use parley::channel::ChannelEvent;
use parley::conversation::{Message, Mode};
use serde::{Deserialize, Serialize};

use crate::responder::Responder;
use crate::rooms::Rooms;

/// Room used for REST turns that name none.
pub const REST_ROOM: &str = "rest";

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<Rooms>,
    pub responder: Arc<dyn Responder>,
    pub started: Instant,
}

/// Request body for POST /api/chat.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub mode: Mode,
    /// Also broadcast the exchange to this room.
    #[serde(default)]
    pub room_id: Option<String>,
}

/// POST /api/chat: run one turn and return the reply message.
///
/// Failures come back as an error-mode system message with status 200; the
/// turn itself completed.
pub async fn post_chat(State(app): State<AppState>, Json(body): Json<ChatBody>) -> Json<Message> {
    let room_id = body.room_id.as_deref().unwrap_or(REST_ROOM);
    if body.room_id.is_some() {
        app.rooms.publish(room_id, ChannelEvent::processing());
    }

    let reply = app.responder.respond(room_id, &body.message, body.mode).await;

    if body.room_id.is_some() && !reply.is_error() {
        app.rooms
            .publish(room_id, ChannelEvent::response(reply.text.clone(), body.mode));
    }
    Json(reply)
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: String,
    pub uptime_secs: u64,
    pub active_rooms: usize,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/health: liveness and active room count.
pub async fn get_health(State(app): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".into(),
        uptime_secs: app.started.elapsed().as_secs(),
        active_rooms: app.rooms.active_rooms(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_defaults_mode_and_room() {
        let body: ChatBody = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(body.mode, Mode::Chat);
        assert!(body.room_id.is_none());

        let body: ChatBody =
            serde_json::from_str(r#"{"message":"hi","mode":"technical","roomId":"r1"}"#).unwrap();
        assert_eq!(body.mode, Mode::Code);
        assert_eq!(body.room_id.as_deref(), Some("r1"));
    }
}
