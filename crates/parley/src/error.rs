//! Error types shared by every layer of the crate.
//!
//! Transport and retry propagate these to their callers. The
//! [`Orchestrator`](crate::conversation::Orchestrator) is the terminal
//! boundary: it converts any [`Error`] into a visible system message instead
//! of returning it.

use thiserror::Error;

/// Result alias used throughout `parley`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while talking to backends or the realtime channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The backend answered with a non-success HTTP status.
    ///
    /// `message` is the backend's own error text when the body carried one,
    /// otherwise `"HTTP <status>: <reason>"`.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (DNS, connect, reset...).
    #[error("request failed: {0}")]
    Network(String),

    /// A response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The provider answered, but reported a failure or returned no content.
    #[error("{0}")]
    Provider(String),

    /// Realtime channel failure (connect, send, closed socket).
    #[error("channel error: {0}")]
    Channel(String),

    /// Invalid configuration or arguments.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation was cancelled through its token.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a provider-logic error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status code, when the error came from a backend response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Network failures, 408, 429 and 5xx are transient; everything else is
    /// permanent. Used by [`with_retry_if`](crate::api::retry::with_retry_if)
    /// callers that want to stop early.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Channel(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_backend_message() {
        let err = Error::Http {
            status: 503,
            message: "HTTP 503: Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Network("connection reset".into()).is_transient());
        assert!(
            Error::Http {
                status: 429,
                message: "rate limited".into()
            }
            .is_transient()
        );
        assert!(
            !Error::Http {
                status: 401,
                message: "unauthorized".into()
            }
            .is_transient()
        );
        assert!(!Error::provider("empty content").is_transient());
    }
}
