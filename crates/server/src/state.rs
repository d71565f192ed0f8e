use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use voice_translator_core::config::ServerConfig;
use voice_translator_core::diag::{HealthProbe, OpenAiHealthProbe};
use voice_translator_core::throttle::RequestThrottle;
use voice_translator_core::translate::{OpenAiTranslator, Translator};
use voice_translator_core::tts::{OpenAiTtsClient, TtsClient};

/// Shared by every handler. Provider clients are absent when no key is
/// configured; the affected endpoints then answer 500.
#[derive(Clone)]
pub struct AppState {
    pub throttle: RequestThrottle,
    pub translator: Option<Arc<dyn Translator>>,
    pub tts: Option<Arc<dyn TtsClient>>,
    pub probe: Arc<dyn HealthProbe>,
}

impl AppState {
    pub fn new(throttle: RequestThrottle, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            throttle,
            translator: None,
            tts: None,
            probe,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_tts(mut self, tts: Arc<dyn TtsClient>) -> Self {
        self.tts = Some(tts);
        self
    }

    /// OpenAI-backed clients from `config`, wall-clock throttling.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut state = Self::new(
            RequestThrottle::in_memory(config.throttle),
            Arc::new(OpenAiHealthProbe::new(config.provider.clone())),
        );

        match OpenAiTranslator::new(config.provider.clone()) {
            Ok(t) => state = state.with_translator(Arc::new(t)),
            Err(e) => tracing::warn!(error = %e, "translation endpoint disabled"),
        }
        match OpenAiTtsClient::new(config.provider.clone()) {
            Ok(t) => state = state.with_tts(Arc::new(t)),
            Err(e) => tracing::warn!(error = %e, "speech endpoint disabled"),
        }
        state
    }
}

/// Periodically drops elapsed throttle buckets so idle clients do not hold
/// store capacity until the next eviction.
pub fn spawn_reaper(throttle: RequestThrottle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let swept = throttle.sweep_expired();
            if swept > 0 {
                tracing::debug!(swept, remaining = throttle.tracked_keys(), "reaped throttle buckets");
            }
        }
    })
}
