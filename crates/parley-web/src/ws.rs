//! WebSocket upgrade handler and room relay.
//!
//! Clients speak the realtime frame protocol:
//! 1. `{"type":"join-room","roomId":…}` subscribes the socket to a room.
//! 2. `{"type":"message","data":{message, mode, roomId}}` broadcasts
//!    `message-processing` to the room, asks the [`Responder`] for a reply,
//!    then broadcasts `message-response`.
//!
//! A failed reply is sent back to the sender alone as an `error` frame.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use parley::channel::{ChannelEvent, ChatRequest};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::responder::Responder;
use crate::rooms::Rooms;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub rooms: Arc<Rooms>,
    pub responder: Arc<dyn Responder>,
    pub auth_token: Option<String>,
}

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// GET /ws?token=…: WebSocket upgrade handler.
///
/// When the server has an auth token configured, connections without the
/// matching `token` query parameter are refused with 401.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(ws_state): State<WsState>,
) -> Response {
    if let Some(expected) = &ws_state.auth_token
        && query.token.as_deref() != Some(expected.as_str())
    {
        warn!("Rejected WebSocket connection with missing or invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, ws_state: WsState) {
    let (sink, mut stream) = socket.split();
    debug!("WebSocket client connected");

    // Everything bound for this client goes through one writer task.
    let (outbox, inbox) = mpsc::unbounded_channel::<ChannelEvent>();
    let writer = tokio::spawn(write_frames(sink, inbox));

    let mut joined = HashSet::new();
    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(event) = ChannelEvent::decode(text.as_str()) else {
                    debug!("Ignoring malformed WebSocket message");
                    continue;
                };
                match event {
                    ChannelEvent::JoinRoom { room_id } => {
                        if joined.insert(room_id.clone()) {
                            info!("Client joined room {room_id}");
                            let rx = ws_state.rooms.join(&room_id);
                            forwarders.push(tokio::spawn(forward_room(rx, outbox.clone())));
                        }
                    }
                    ChannelEvent::Message { data } => {
                        handle_chat(data, &ws_state, &outbox);
                    }
                    other => debug!("Ignoring client {} frame", other.kind().as_wire()),
                }
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    debug!("WebSocket client disconnected");
    for forwarder in forwarders {
        forwarder.abort();
        // Awaiting drops the task's room receiver before pruning.
        let _ = forwarder.await;
    }
    ws_state.rooms.prune();
    writer.abort();
}

/// Relay one chat message: processing notice, reply, then response or error.
fn handle_chat(data: ChatRequest, ws_state: &WsState, outbox: &mpsc::UnboundedSender<ChannelEvent>) {
    let Some(room_id) = data.room_id.clone() else {
        let _ = outbox.send(ChannelEvent::error("roomId is required"));
        return;
    };

    ws_state.rooms.publish(&room_id, ChannelEvent::processing());

    let rooms = ws_state.rooms.clone();
    let responder = ws_state.responder.clone();
    let outbox = outbox.clone();
    tokio::spawn(async move {
        let reply = responder.respond(&room_id, &data.message, data.mode).await;
        if reply.is_error() {
            let _ = outbox.send(ChannelEvent::error(reply.text));
        } else {
            rooms.publish(&room_id, ChannelEvent::response(reply.text, data.mode));
        }
    });
}

/// Forward one room's broadcasts into this client's outbox.
async fn forward_room(
    mut rx: broadcast::Receiver<ChannelEvent>,
    outbox: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if outbox.send(event).is_err() {
                    break; // Client disconnected.
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("WebSocket client lagged by {n} room events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut inbox: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = inbox.recv().await {
        let json = match event.encode() {
            Ok(json) => json,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}
