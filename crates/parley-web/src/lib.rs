//! Realtime room relay for parley orchestrators.
//!
//! `parley-web` is the server end of the realtime frame protocol spoken by
//! [`parley::channel::RealtimeChannel`]. Clients join rooms over a WebSocket;
//! every chat message sent to a room is answered by a [`Responder`] and the
//! exchange is broadcast to all members. A small REST API covers one-shot
//! turns and health checks.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley::prelude::*;
//! use parley_web::{OrchestratorResponder, WebConfig, spawn_web};
//!
//! let services = Services::from_config(PlatformConfig::from_env())?;
//! let responder = Arc::new(OrchestratorResponder::new(services));
//!
//! let addr = spawn_web(WebConfig::default(), responder).await?;
//! println!("Relay: ws://{addr}/ws");
//! ```
//!
//! # Architecture
//!
//! ```text
//! client ──join-room──▶ Rooms (broadcast per room) ──▶ every member
//! client ──message───▶ message-processing ─▶ Responder ─▶ message-response
//!                                                 └─ failure ─▶ error (sender only)
//! ```

mod api;
pub mod responder;
pub mod rooms;
mod server;
mod ws;

pub use api::{ChatBody, HealthBody, REST_ROOM};
pub use responder::{DEFAULT_MAX_ROOMS, EchoResponder, OrchestratorResponder, Responder, ResponseFuture};
pub use rooms::Rooms;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for the relay server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:5000`.
    pub bind_addr: SocketAddr,
    /// When set, WebSocket clients must connect with `?token=<value>`.
    pub auth_token: Option<String>,
    /// Directory of static front-end files served at `/`.
    pub static_dir: Option<PathBuf>,
    /// Buffered events per room before slow clients start missing some.
    /// Default: 256.
    pub room_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            auth_token: None,
            static_dir: None,
            room_capacity: 256,
        }
    }
}

/// Spawn the relay on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(config: WebConfig, responder: Arc<dyn Responder>) -> std::io::Result<SocketAddr> {
    let rooms = Arc::new(Rooms::new(config.room_capacity));
    let router = server::build_router(rooms, responder, config.auth_token, config.static_dir);
    server::start_server(router, config.bind_addr).await
}
