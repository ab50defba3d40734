//! Per-message provider routing.
//!
//! Short conversational messages go to the primary provider. Code-heavy or
//! long messages go to the secondary provider, which also receives recent
//! conversation context. Routing is pure: the same text and mode always pick
//! the same provider.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::conversation::Mode;

/// Default character count above which a message is considered complex.
pub const DEFAULT_LENGTH_THRESHOLD: usize = 500;

static CODE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(code|script|function|algorithm|debug|program)\b")
        .expect("static keyword pattern is valid")
});

/// Upstream language-model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Conversational provider (Claude backend).
    Primary,
    /// Technical/long-context provider (DeepSeek backend).
    Secondary,
}

impl ProviderId {
    /// Model label recorded in message metadata when the backend omits one.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderId::Primary => "claude",
            ProviderId::Secondary => "deepseek",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::Primary => write!(f, "primary"),
            ProviderId::Secondary => write!(f, "secondary"),
        }
    }
}

/// Why a message was routed where it was. Logged with every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    ComplexMode,
    CodeKeyword,
    LongMessage,
    Default,
}

/// Routing rules.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Modes that always go to the secondary provider.
    pub complex_modes: Vec<Mode>,
    /// Messages longer than this many characters go to the secondary provider.
    pub length_threshold: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            complex_modes: vec![Mode::Code],
            length_threshold: DEFAULT_LENGTH_THRESHOLD,
        }
    }
}

/// Stateless provider selector.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    config: RouterConfig,
}

impl ModelRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Pick the provider for `message` sent in `mode`.
    pub fn select_provider(&self, message: &str, mode: Mode) -> ProviderId {
        self.route(message, mode).0
    }

    /// Pick the provider and report the rule that decided it.
    pub fn route(&self, message: &str, mode: Mode) -> (ProviderId, RouteReason) {
        if self.config.complex_modes.contains(&mode) {
            (ProviderId::Secondary, RouteReason::ComplexMode)
        } else if CODE_KEYWORDS.is_match(message) {
            (ProviderId::Secondary, RouteReason::CodeKeyword)
        } else if message.chars().count() > self.config.length_threshold {
            (ProviderId::Secondary, RouteReason::LongMessage)
        } else {
            (ProviderId::Primary, RouteReason::Default)
        }
    }
}
