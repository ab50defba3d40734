//! The conversation orchestrator: one user turn from text to reply.
//!
//! A turn appends the user message, routes it to a provider, calls the
//! provider through the retry policy, post-processes the reply for the mode,
//! optionally synthesizes speech, and appends the reply. Failures become a
//! visible system message; [`Orchestrator::send_message`] never fails.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::export::{ExportFormat, export_conversation};
use super::history::{ConversationHistory, ConversationSummary};
use super::message::{Message, MessageMetadata, Mode};
use super::prompts::{post_process, system_prompt};
use crate::api::providers::{CONTEXT_WINDOW, Completion, ProviderClient, SendOptions};
use crate::api::retry::{RetryConfig, Sleeper, TokioSleeper, with_retry_using};
use crate::api::router::{ModelRouter, ProviderId};
use crate::api::speech::{SpeechClient, SpeechRequest};
use crate::api::tracing::{UsageTracker, generate_turn_id};
use crate::error::Result;

/// Voice used for audio-mode replies unless overridden.
pub const DEFAULT_VOICE: &str = "nova";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns one conversation history and sequences turns against it.
///
/// History lives behind a mutex that is only held for synchronous reads and
/// appends. Concurrent [`send_message`](Self::send_message) calls therefore
/// run their network calls in parallel, and replies are appended in
/// completion order: each reply follows its own user message, but replies
/// from different turns may cross.
pub struct Orchestrator {
    providers: ProviderClient,
    speech: Option<SpeechClient>,
    router: ModelRouter,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    voice: String,
    history: Mutex<ConversationHistory>,
    usage: Mutex<UsageTracker>,
}

impl Orchestrator {
    pub fn new(providers: ProviderClient) -> Self {
        Self {
            providers,
            speech: None,
            router: ModelRouter::default(),
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            voice: DEFAULT_VOICE.to_string(),
            history: Mutex::new(ConversationHistory::new()),
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    pub fn with_speech(mut self, speech: SpeechClient) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_router(mut self, router: ModelRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Token that aborts retry waits for every turn.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Run one turn and return the appended reply.
    ///
    /// The reply is an ai message on success and a system message in
    /// [`Mode::Error`] on failure.
    pub async fn send_message(&self, text: &str, mode: Mode, options: &SendOptions) -> Message {
        let turn_id = generate_turn_id();

        let context = {
            let mut history = lock(&self.history);
            history.push(Message::user(text, mode));
            history.last_n(CONTEXT_WINDOW).to_vec()
        };

        let (provider, reason) = self.router.route(text, mode);
        info!("[{turn_id}] {mode} turn routed to {provider} ({reason:?})");

        let result = with_retry_using(
            &self.retry,
            self.sleeper.as_ref(),
            &self.cancel,
            |_| true,
            || self.call_provider(provider, text, mode, &context, options),
        )
        .await;

        let reply = match result {
            Ok(completion) => {
                lock(&self.usage).record(provider, completion.usage.as_ref());
                self.build_reply(&turn_id, completion, mode, options).await
            }
            Err(e) => {
                warn!("[{turn_id}] Turn failed: {e}");
                Message::error(&e)
            }
        };

        lock(&self.history).push(reply.clone());
        reply
    }

    async fn call_provider(
        &self,
        provider: ProviderId,
        text: &str,
        mode: Mode,
        context: &[Message],
        options: &SendOptions,
    ) -> Result<Completion> {
        match provider {
            ProviderId::Primary => {
                self.providers
                    .send_primary(text, mode, system_prompt(mode), options)
                    .await
            }
            ProviderId::Secondary => self.providers.send_secondary(context, options).await,
        }
    }

    async fn build_reply(
        &self,
        turn_id: &str,
        completion: Completion,
        mode: Mode,
        options: &SendOptions,
    ) -> Message {
        // Only primary replies are shaped for the mode; secondary text is kept as sent.
        let content = match completion.provider {
            ProviderId::Primary => post_process(&completion.content, mode),
            ProviderId::Secondary => completion.content,
        };
        let reply = Message::ai(
            content,
            mode,
            MessageMetadata {
                model: completion.model,
                usage: completion.usage,
                processing_time: completion.processing_time,
            },
        );

        if !(options.generate_audio && mode == Mode::Audio) {
            return reply;
        }
        let Some(speech) = &self.speech else {
            debug!("[{turn_id}] Audio requested but no speech client configured");
            return reply;
        };

        let request = SpeechRequest::new(reply.text.clone()).with_voice(self.voice.clone());
        match speech.synthesize(&request).await {
            Ok(audio) => {
                debug!("[{turn_id}] Attached {} audio", audio.format);
                reply.with_audio(audio.audio_data, audio.duration)
            }
            Err(e) => {
                warn!("[{turn_id}] Speech synthesis failed, keeping text reply: {e}");
                reply
            }
        }
    }

    /// Snapshot of the history, oldest first.
    pub fn history(&self) -> Vec<Message> {
        lock(&self.history).messages().to_vec()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
        info!("Conversation history cleared");
    }

    pub fn summary(&self) -> ConversationSummary {
        lock(&self.history).summary()
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let history = lock(&self.history).clone();
        export_conversation(&history, format)
    }

    /// Token usage across every turn so far.
    pub fn usage_summary(&self) -> String {
        lock(&self.usage).summary()
    }
}
