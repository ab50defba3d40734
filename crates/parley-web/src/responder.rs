//! Producing replies for relayed messages.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley::api::providers::SendOptions;
use parley::conversation::{Message, MessageMetadata, Mode, Orchestrator};
use parley::services::Services;
use tracing::debug;

/// Boxed future returned by [`Responder::respond`].
pub type ResponseFuture<'a> = Pin<Box<dyn Future<Output = Message> + Send + 'a>>;

/// Turns a user message into a reply.
///
/// Replies are ai messages on success and error-mode system messages on
/// failure; the relay forwards the former to the room and the latter to the
/// sender only.
pub trait Responder: Send + Sync {
    fn respond<'a>(&'a self, room_id: &'a str, message: &'a str, mode: Mode) -> ResponseFuture<'a>;
}

/// Replies with a canned acknowledgement after an optional delay.
#[derive(Debug, Clone, Default)]
pub struct EchoResponder {
    pub delay: Duration,
}

impl EchoResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Responder for EchoResponder {
    fn respond<'a>(&'a self, _room_id: &'a str, message: &'a str, mode: Mode) -> ResponseFuture<'a> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Message::ai(
                format!("AI response to: {message}"),
                mode,
                MessageMetadata {
                    model: "echo".into(),
                    usage: None,
                    processing_time: Some(self.delay.as_secs_f64()),
                },
            )
        })
    }
}

/// Rooms whose orchestrators are kept by default.
pub const DEFAULT_MAX_ROOMS: usize = 1024;

/// Runs each room's turns through its own [`Orchestrator`], so every room
/// keeps a separate history.
///
/// At most `max_rooms` orchestrators are kept; opening another room evicts
/// the least recently used one, and with it that room's history.
pub struct OrchestratorResponder {
    services: Services,
    options: SendOptions,
    max_rooms: usize,
    rooms: Mutex<RoomOrchestrators>,
}

#[derive(Default)]
struct RoomOrchestrators {
    clock: u64,
    entries: HashMap<String, (Arc<Orchestrator>, u64)>,
}

impl OrchestratorResponder {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            options: SendOptions::default(),
            max_rooms: DEFAULT_MAX_ROOMS,
            rooms: Mutex::new(RoomOrchestrators::default()),
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    /// Cap the number of rooms with a live history (minimum 1).
    pub fn with_max_rooms(mut self, max_rooms: usize) -> Self {
        self.max_rooms = max_rooms.max(1);
        self
    }

    /// The orchestrator for `room_id`, created on first use.
    pub fn orchestrator(&self, room_id: &str) -> Arc<Orchestrator> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.clock += 1;
        let now = rooms.clock;

        if let Some((orchestrator, last_used)) = rooms.entries.get_mut(room_id) {
            *last_used = now;
            return orchestrator.clone();
        }

        if rooms.entries.len() >= self.max_rooms {
            let oldest = rooms
                .entries
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                rooms.entries.remove(&oldest);
                debug!("Evicted idle room {oldest}");
            }
        }

        let orchestrator = Arc::new(self.services.orchestrator());
        rooms
            .entries
            .insert(room_id.to_string(), (orchestrator.clone(), now));
        orchestrator
    }

    /// Rooms with a live orchestrator.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }
}

impl Responder for OrchestratorResponder {
    fn respond<'a>(&'a self, room_id: &'a str, message: &'a str, mode: Mode) -> ResponseFuture<'a> {
        let orchestrator = self.orchestrator(room_id);
        Box::pin(async move { orchestrator.send_message(message, mode, &self.options).await })
    }
}
