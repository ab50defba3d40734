//! Resilient orchestration for a multimedia AI platform.
//!
//! `parley` sits between a chat front end and a set of opaque HTTP backends:
//! two language-model providers (a conversational *primary* and a technical
//! *secondary*), a text-to-speech service, and an export renderer. It does
//! none of the heavy lifting itself. What it provides is the plumbing that
//! makes those calls dependable:
//!
//! - a JSON [`Transport`](api::transport::Transport) with auth injection and
//!   one normalized [`Error`] shape,
//! - [`with_retry`](api::retry::with_retry): exponential backoff with a cap,
//!   optional jitter, and cancellation,
//! - a pure [`ModelRouter`](api::router::ModelRouter) that picks a provider
//!   per message,
//! - a [`RealtimeChannel`](channel::RealtimeChannel) that keeps a WebSocket
//!   room connection alive and dispatches typed events,
//! - the [`Orchestrator`](conversation::Orchestrator), which turns one user
//!   message into one reply and never fails.
//!
//! # Getting started
//!
//! ```ignore
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), parley::Error> {
//!     let services = Services::from_config(PlatformConfig::from_env())?;
//!     let orchestrator = services.orchestrator();
//!
//!     let reply = orchestrator
//!         .send_message("Explain retry jitter", Mode::Chat, &SendOptions::default())
//!         .await;
//!     println!("{}: {}", reply.sender, reply.text);
//!
//!     println!("{}", orchestrator.export(ExportFormat::Markdown)?);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Transport, retry, routing, provider/speech/job clients, health, usage |
//! | [`channel`] | Realtime channel, wire frames, subscriptions, reconnect policy |
//! | [`conversation`] | Messages, history, prompts, export, orchestrator |
//! | [`config`] | [`PlatformConfig`](config::PlatformConfig) and environment overrides |
//! | [`services`] | [`Services`](services::Services): every client built from one config |

pub mod api;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prelude;
pub mod services;

pub use error::{Error, Result};

/// `User-Agent` sent on every HTTP request.
pub const USER_AGENT: &str = concat!("parley/", env!("CARGO_PKG_VERSION"));
