//! Request and reply shapes for the two chat backends.
//!
//! The primary provider takes a single message plus a mode-specific system
//! prompt. The secondary provider takes a short window of prior turns as
//! role-tagged context. Both reply with the same envelope.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::router::ProviderId;
use super::tracing::Usage;
use super::transport::{Transport, send_json};
use crate::conversation::{Message, Mode, Sender};
use crate::error::{Error, Result};

pub const PRIMARY_ENDPOINT: &str = "/chat/claude";
pub const SECONDARY_ENDPOINT: &str = "/chat/deepseek";

/// Number of history entries sent to the secondary provider.
pub const CONTEXT_WINDOW: usize = 5;

/// Per-call generation overrides. Unset fields use the provider defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// Synthesize speech for audio-mode replies.
    pub generate_audio: bool,
}

impl SendOptions {
    pub fn with_audio(mut self, generate_audio: bool) -> Self {
        self.generate_audio = generate_audio;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ── Wire shapes ────────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryOptions {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PrimaryRequest {
    pub message: String,
    pub mode: Mode,
    pub options: PrimaryOptions,
}

/// Role of a context entry sent to the secondary provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ContextMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.sender {
            Sender::User => Role::User,
            Sender::Ai | Sender::System => Role::Assistant,
        };
        Self {
            role,
            content: msg.text.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SecondaryRequest {
    pub messages: Vec<ContextMessage>,
    pub options: SecondaryOptions,
}

/// Reply envelope shared by both chat backends.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default, alias = "processing_time")]
    pub processing_time: Option<f64>,
}

/// A successful provider answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub provider: ProviderId,
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub processing_time: Option<f64>,
}

impl ProviderReply {
    /// Turn the envelope into a [`Completion`], or a provider error when the
    /// backend reported failure or sent no content.
    pub fn into_completion(self, provider: ProviderId) -> Result<Completion> {
        if !self.success {
            return Err(Error::provider(
                self.error
                    .unwrap_or_else(|| format!("{provider} provider reported failure")),
            ));
        }
        let content = self
            .content
            .ok_or_else(|| Error::provider(format!("{provider} provider returned no content")))?;
        Ok(Completion {
            provider,
            content,
            model: self
                .model
                .unwrap_or_else(|| provider.default_model().to_string()),
            usage: self.usage,
            processing_time: self.processing_time,
        })
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Chat calls against the platform API backend.
#[derive(Clone)]
pub struct ProviderClient {
    transport: Arc<dyn Transport>,
    auth_token: Option<String>,
}

impl ProviderClient {
    pub fn new(transport: Arc<dyn Transport>, auth_token: Option<String>) -> Self {
        Self {
            transport,
            auth_token,
        }
    }

    /// Single-message call with the mode's system prompt.
    pub async fn send_primary(
        &self,
        text: &str,
        mode: Mode,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<Completion> {
        let request = PrimaryRequest {
            message: text.to_string(),
            mode,
            options: PrimaryOptions {
                system_prompt: system_prompt.to_string(),
                max_tokens: options.max_tokens.unwrap_or(2000),
                temperature: options.temperature.unwrap_or(0.7),
            },
        };
        debug!("Primary request: {} chars, mode {mode}", text.chars().count());
        let reply: ProviderReply = send_json(
            self.transport.as_ref(),
            PRIMARY_ENDPOINT,
            &request,
            self.auth_token.as_deref(),
        )
        .await?;
        reply.into_completion(ProviderId::Primary)
    }

    /// Multi-turn call with `context` as role-tagged history.
    pub async fn send_secondary(
        &self,
        context: &[Message],
        options: &SendOptions,
    ) -> Result<Completion> {
        let request = SecondaryRequest {
            messages: context.iter().map(ContextMessage::from).collect(),
            options: SecondaryOptions {
                max_tokens: options.max_tokens.unwrap_or(1500),
                temperature: options.temperature.unwrap_or(0.8),
                top_p: options.top_p.unwrap_or(0.9),
            },
        };
        debug!("Secondary request: {} context message(s)", request.messages.len());
        let reply: ProviderReply = send_json(
            self.transport.as_ref(),
            SECONDARY_ENDPOINT,
            &request,
            self.auth_token.as_deref(),
        )
        .await?;
        reply.into_completion(ProviderId::Secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_roles_map_system_to_assistant() {
        let user = Message::user("hi", Mode::Chat);
        let err = Message::error("boom");
        assert_eq!(ContextMessage::from(&user).role, Role::User);
        assert_eq!(ContextMessage::from(&err).role, Role::Assistant);
    }

    #[test]
    fn primary_request_shape() {
        let request = PrimaryRequest {
            message: "hello".into(),
            mode: Mode::Chat,
            options: PrimaryOptions {
                system_prompt: "be nice".into(),
                max_tokens: 2000,
                temperature: 0.5,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "hello",
                "mode": "chat",
                "options": {"systemPrompt": "be nice", "maxTokens": 2000, "temperature": 0.5}
            })
        );
    }

    #[test]
    fn failed_reply_becomes_provider_error() {
        let reply: ProviderReply =
            serde_json::from_value(json!({"success": false, "error": "quota exceeded"})).unwrap();
        let err = reply.into_completion(ProviderId::Primary).unwrap_err();
        assert_eq!(err, Error::provider("quota exceeded"));
    }

    #[test]
    fn missing_content_is_an_error() {
        let reply: ProviderReply = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(reply.into_completion(ProviderId::Secondary).is_err());
    }

    #[test]
    fn model_defaults_per_provider() {
        let reply: ProviderReply = serde_json::from_value(
            json!({"success": true, "content": "ok", "processingTime": 1.25}),
        )
        .unwrap();
        let completion = reply.into_completion(ProviderId::Secondary).unwrap();
        assert_eq!(completion.model, "deepseek");
        assert_eq!(completion.processing_time, Some(1.25));
    }
}
