//! Text-to-speech passthrough to the media backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transport::{Transport, get_json, send_json};
use crate::error::{Error, Result};

pub const SYNTHESIZE_ENDPOINT: &str = "/tts/synthesize";
pub const VOICES_ENDPOINT: &str = "/voices";

/// Synthesis request. Field names match the media backend.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub speed: f32,
    pub format: String,
    pub quality: String,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: "alloy".into(),
            language: "fr".into(),
            speed: 1.0,
            format: "mp3".into(),
            quality: "high".into(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
struct SpeechReply {
    #[serde(default)]
    success: bool,
    #[serde(default, alias = "audioData")]
    audio_data: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// A voice offered by the speech backend.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// Synthesized audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    /// Base64-encoded audio bytes.
    pub audio_data: String,
    pub format: String,
    /// Length in seconds, when the backend reports it.
    pub duration: Option<f64>,
}

#[derive(Clone)]
pub struct SpeechClient {
    transport: Arc<dyn Transport>,
    auth_token: Option<String>,
}

impl SpeechClient {
    pub fn new(transport: Arc<dyn Transport>, auth_token: Option<String>) -> Self {
        Self {
            transport,
            auth_token,
        }
    }

    pub async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio> {
        debug!(
            "Synthesizing {} chars (voice {}, {})",
            request.text.chars().count(),
            request.voice,
            request.language
        );
        let reply: SpeechReply = send_json(
            self.transport.as_ref(),
            SYNTHESIZE_ENDPOINT,
            request,
            self.auth_token.as_deref(),
        )
        .await?;

        if !reply.success {
            return Err(Error::provider(
                reply.error.unwrap_or_else(|| "speech synthesis failed".into()),
            ));
        }
        let audio_data = reply
            .audio_data
            .filter(|data| !data.is_empty())
            .ok_or_else(|| Error::provider("speech synthesis returned no audio"))?;
        Ok(SpeechAudio {
            audio_data,
            format: reply.format.unwrap_or_else(|| request.format.clone()),
            duration: reply.duration,
        })
    }

    /// Voices the backend can synthesize with.
    pub async fn voices(&self) -> Result<Vec<Voice>> {
        let list: VoiceList =
            get_json(self.transport.as_ref(), VOICES_ENDPOINT, self.auth_token.as_deref()).await?;
        Ok(list.voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::TransportFuture;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Canned {
        reply: Value,
        seen: Mutex<Vec<(String, Value)>>,
    }

    impl Transport for Canned {
        fn post<'a>(
            &'a self,
            endpoint: &'a str,
            payload: &'a Value,
            _auth_token: Option<&'a str>,
        ) -> TransportFuture<'a> {
            self.seen
                .lock()
                .unwrap()
                .push((endpoint.to_string(), payload.clone()));
            let reply = self.reply.clone();
            Box::pin(async move { Ok(reply) })
        }

        fn get<'a>(&'a self, endpoint: &'a str, _auth_token: Option<&'a str>) -> TransportFuture<'a> {
            self.seen
                .lock()
                .unwrap()
                .push((endpoint.to_string(), Value::Null));
            let reply = self.reply.clone();
            Box::pin(async move { Ok(reply) })
        }
    }

    #[tokio::test]
    async fn synthesize_sends_defaults_and_reads_snake_case() {
        let transport = Arc::new(Canned {
            reply: json!({"success": true, "audio_data": "AAAA", "format": "mp3", "duration": 2.5}),
            seen: Mutex::new(Vec::new()),
        });
        let client = SpeechClient::new(transport.clone(), None);

        let audio = client.synthesize(&SpeechRequest::new("bonjour")).await.unwrap();
        assert_eq!(audio.audio_data, "AAAA");
        assert_eq!(audio.duration, Some(2.5));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, SYNTHESIZE_ENDPOINT);
        assert_eq!(seen[0].1["voice"], "alloy");
        assert_eq!(seen[0].1["language"], "fr");
        assert_eq!(seen[0].1["quality"], "high");
    }

    #[tokio::test]
    async fn camel_case_audio_field_is_accepted() {
        let transport = Arc::new(Canned {
            reply: json!({"success": true, "audioData": "BBBB"}),
            seen: Mutex::new(Vec::new()),
        });
        let client = SpeechClient::new(transport, None);
        let audio = client
            .synthesize(&SpeechRequest::new("hi").with_voice("nova"))
            .await
            .unwrap();
        assert_eq!(audio.audio_data, "BBBB");
        assert_eq!(audio.format, "mp3");
    }

    #[tokio::test]
    async fn failure_reply_is_an_error() {
        let transport = Arc::new(Canned {
            reply: json!({"success": false, "error": "voice not found"}),
            seen: Mutex::new(Vec::new()),
        });
        let client = SpeechClient::new(transport, None);
        let err = client.synthesize(&SpeechRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "voice not found");
    }

    #[tokio::test]
    async fn voices_are_listed() {
        let transport = Arc::new(Canned {
            reply: json!({"voices": [
                {"id": "alloy", "name": "Alloy", "language": "fr", "gender": "neutral"},
                {"id": "nova", "name": "Nova", "language": "fr", "gender": "female"}
            ]}),
            seen: Mutex::new(Vec::new()),
        });
        let client = SpeechClient::new(transport.clone(), None);

        let voices = client.voices().await.unwrap();
        let ids: Vec<&str> = voices.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["alloy", "nova"]);
        assert_eq!(voices[1].gender.as_deref(), Some("female"));
        assert_eq!(transport.seen.lock().unwrap()[0].0, VOICES_ENDPOINT);
    }
}
