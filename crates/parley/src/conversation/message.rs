//! Conversation message types.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::tracing::Usage;
use crate::error::Error;

/// Conversation mode: selects the system prompt, post-processing, and
/// routing bias for a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Documents,
    #[serde(alias = "technical")]
    Code,
    Audio,
    /// Tag carried by system messages that report a failed turn.
    Error,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Chat, Mode::Documents, Mode::Code, Mode::Audio, Mode::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Documents => "documents",
            Mode::Code => "code",
            Mode::Audio => "audio",
            Mode::Error => "error",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Mode::Chat),
            "documents" => Ok(Mode::Documents),
            "code" | "technical" => Ok(Mode::Code),
            "audio" => Ok(Mode::Audio),
            "error" => Ok(Mode::Error),
            other => Err(Error::config(format!("unknown mode: {other}"))),
        }
    }
}

/// Who produced a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    System,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "ai"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// Provider details attached to AI replies.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Backend-reported processing time, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// One entry in a conversation history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    /// Base64-encoded synthesized speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    /// Duration of `audio_data`, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    fn new(text: impl Into<String>, sender: Sender, mode: Mode) -> Self {
        Self {
            id: next_message_id(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            mode,
            audio_data: None,
            audio_duration: None,
            metadata: None,
        }
    }

    pub fn user(text: impl Into<String>, mode: Mode) -> Self {
        Self::new(text, Sender::User, mode)
    }

    pub fn ai(text: impl Into<String>, mode: Mode, metadata: MessageMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::new(text, Sender::Ai, mode)
        }
    }

    /// A system message reporting a failed turn. Always tagged [`Mode::Error`].
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::new(
            format!("Error: {reason}. Please try again."),
            Sender::System,
            Mode::Error,
        )
    }

    /// Attach synthesized audio. Only used before the message is appended.
    pub fn with_audio(mut self, audio_data: String, duration: Option<f64>) -> Self {
        self.audio_data = Some(audio_data);
        self.audio_duration = duration;
        self
    }

    pub fn is_error(&self) -> bool {
        self.sender == Sender::System && self.mode == Mode::Error
    }
}

/// Next message ID: current Unix time in milliseconds, bumped past the last
/// issued ID so IDs stay unique and strictly increasing within the process.
pub fn next_message_id() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}
