//! The explicitly constructed service context.
//!
//! [`Services`] bundles every client built from one [`PlatformConfig`]. Build
//! it once at startup and pass it (or the pieces you need) to the code that
//! uses it.

use std::sync::Arc;

use crate::api::documents::DocumentClient;
use crate::api::health::{SystemHealth, check_system};
use crate::api::jobs::JobClient;
use crate::api::providers::ProviderClient;
use crate::api::router::ModelRouter;
use crate::api::speech::SpeechClient;
use crate::api::transport::{HttpTransport, Transport};
use crate::channel::{RealtimeChannel, WsConnector};
use crate::config::PlatformConfig;
use crate::conversation::Orchestrator;
use crate::error::Result;

#[derive(Clone)]
pub struct Services {
    pub config: PlatformConfig,
    pub api: Arc<dyn Transport>,
    pub media: Arc<dyn Transport>,
    pub router: ModelRouter,
    pub providers: ProviderClient,
    pub speech: SpeechClient,
    pub documents: DocumentClient,
    pub jobs: JobClient,
    pub channel: RealtimeChannel,
}

impl Services {
    /// Build HTTP transports and the realtime channel from `config`.
    ///
    /// Nothing connects yet; the channel opens on
    /// [`RealtimeChannel::connect`].
    pub fn from_config(config: PlatformConfig) -> Result<Self> {
        let api: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.api_base_url, config.request_timeout)?);
        let media: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.media_base_url, config.request_timeout)?);
        let channel = RealtimeChannel::new(
            Arc::new(WsConnector::new(&config.ws_url, config.auth_token.clone())),
            config.reconnect.clone(),
        );
        Ok(Self::with_transports(config, api, media, channel))
    }

    /// Assemble services over caller-supplied transports and channel.
    pub fn with_transports(
        config: PlatformConfig,
        api: Arc<dyn Transport>,
        media: Arc<dyn Transport>,
        channel: RealtimeChannel,
    ) -> Self {
        let token = config.auth_token.clone();
        Self {
            router: ModelRouter::new(config.router.clone()),
            providers: ProviderClient::new(api.clone(), token.clone()),
            speech: SpeechClient::new(media.clone(), token.clone()),
            documents: DocumentClient::new(api.clone(), token.clone()),
            jobs: JobClient::new(media.clone(), token),
            api,
            media,
            channel,
            config,
        }
    }

    /// A fresh orchestrator with its own empty history.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.providers.clone())
            .with_speech(self.speech.clone())
            .with_router(self.router.clone())
            .with_retry(self.config.retry.clone())
    }

    pub async fn health(&self) -> SystemHealth {
        check_system(&self.api, &self.media).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config_without_connecting() {
        let services = Services::from_config(PlatformConfig::default()).unwrap();
        assert_eq!(services.channel.state(), crate::channel::ChannelState::Disconnected);
        assert!(services.orchestrator().history().is_empty());
    }
}
