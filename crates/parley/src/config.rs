//! Platform configuration.

use std::time::Duration;

use crate::api::retry::RetryConfig;
use crate::api::router::RouterConfig;
use crate::channel::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_MEDIA_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000";
pub const DEFAULT_ROOM: &str = "default";

/// Where the backends live and how to talk to them.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Chat backend (`/chat/*`, `/health`).
    pub api_base_url: String,
    /// Media backend (`/tts/*`, `/export/*`, `/health`).
    pub media_base_url: String,
    pub ws_url: String,
    /// Sent as a bearer token over HTTP and as `?token=` on the WebSocket.
    pub auth_token: Option<String>,
    pub default_room: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    pub retry: RetryConfig,
    pub reconnect: ReconnectPolicy,
    pub router: RouterConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.into(),
            media_base_url: DEFAULT_MEDIA_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            auth_token: None,
            default_room: DEFAULT_ROOM.into(),
            request_timeout: None,
            retry: RetryConfig::default(),
            reconnect: ReconnectPolicy::default(),
            router: RouterConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Defaults overridden by `PARLEY_API_URL`, `PARLEY_MEDIA_URL`,
    /// `PARLEY_WS_URL`, `PARLEY_AUTH_TOKEN`, and `PARLEY_ROOM`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = get("PARLEY_API_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = get("PARLEY_MEDIA_URL") {
            config.media_base_url = url;
        }
        if let Some(url) = get("PARLEY_WS_URL") {
            config.ws_url = url;
        }
        if let Some(room) = get("PARLEY_ROOM") {
            config.default_room = room;
        }
        config.auth_token = get("PARLEY_AUTH_TOKEN");
        config
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_base_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.default_room = room.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_local_backends() {
        let config = PlatformConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.media_base_url, "http://localhost:8000/api");
        assert_eq!(config.ws_url, "ws://localhost:5000");
        assert_eq!(config.reconnect.delay, Duration::from_millis(3000));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn lookup_overrides_and_ignores_blank_values() {
        let vars: HashMap<&str, &str> = [
            ("PARLEY_API_URL", "http://api.test/api"),
            ("PARLEY_AUTH_TOKEN", "secret"),
            ("PARLEY_WS_URL", "  "),
        ]
        .into_iter()
        .collect();

        let config = PlatformConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://api.test/api");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.media_base_url, DEFAULT_MEDIA_URL);
    }
}
