//! Convenience re-exports for common `parley` types.
//!
//! ```ignore
//! use parley::prelude::*;
//! ```
//!
//! Wire-level types (frame payloads, provider request structs) are left out;
//! import those from their modules when needed.

// ── Core ────────────────────────────────────────────────────────────
pub use crate::config::PlatformConfig;
pub use crate::error::{Error, Result};
pub use crate::services::Services;

// ── Backends ────────────────────────────────────────────────────────
pub use crate::api::documents::{DocumentAnalysis, DocumentClient};
pub use crate::api::jobs::{ExportKind, JobClient, JobStatus, PollConfig};
pub use crate::api::providers::{ProviderClient, SendOptions};
pub use crate::api::retry::{RetryConfig, with_retry, with_retry_if};
pub use crate::api::router::{ModelRouter, ProviderId, RouterConfig};
pub use crate::api::speech::{SpeechClient, SpeechRequest};
pub use crate::api::transport::{HttpTransport, Transport};

// ── Realtime ────────────────────────────────────────────────────────
pub use crate::channel::{ChannelEvent, ChannelState, EventKind, RealtimeChannel, ReconnectPolicy};

// ── Conversation ────────────────────────────────────────────────────
pub use crate::conversation::{
    ConversationSummary, ExportFormat, Message, Mode, Orchestrator, Sender,
};
