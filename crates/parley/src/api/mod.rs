//! Backend API layer.
//!
//! - [`transport`]: JSON-over-HTTP with auth injection and error normalization
//! - [`retry`]: exponential backoff with a cap, jitter, and cancellation
//! - [`router`]: per-message provider selection
//! - [`providers`]: chat request/reply shapes for the primary and secondary backends
//! - [`speech`]: text-to-speech passthrough
//! - [`documents`]: document analysis
//! - [`jobs`]: export job submission and polling
//! - [`health`]: backend health checks
//! - [`tracing`]: turn IDs and token usage

pub mod documents;
pub mod health;
pub mod jobs;
pub mod providers;
pub mod retry;
pub mod router;
pub mod speech;
pub mod tracing;
pub mod transport;
