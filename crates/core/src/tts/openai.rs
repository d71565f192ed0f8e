use crate::catalog::DEFAULT_VOICE;
use crate::config::{ApiKey, ProviderConfig};
use crate::tts::{EncodedAudio, TtsClient, TtsError, TtsRequest, MIME_MPEG};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;

const TTS_MODEL: &str = "tts-1";

#[derive(Clone)]
pub struct OpenAiTtsClient {
    client: Client,
    api_key: ApiKey,
    provider: ProviderConfig,
    retry: RetryConfig,
}

impl OpenAiTtsClient {
    pub fn new(provider: ProviderConfig) -> Result<Self, TtsError> {
        let api_key = provider
            .api_key
            .clone()
            .ok_or(TtsError::NotConfigured("OPENAI_API_KEY missing"))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            provider,
            retry: RetryConfig::default(),
        })
    }

    async fn request_once(&self, body: &SpeechRequest<'_>) -> Result<EncodedAudio, TtsError> {
        let url = self.provider.endpoint("audio/speech")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_owned());
            return Err(TtsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(MIME_MPEG)
            .to_owned();
        let bytes = response.bytes().await?;
        Ok(EncodedAudio {
            bytes,
            content_type,
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl TtsClient for OpenAiTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<EncodedAudio, TtsError>> {
        async move {
            if request.text.trim().is_empty() {
                return Err(TtsError::EmptyText);
            }
            let voice = request
                .voice
                .as_ref()
                .map(|v| v.as_str())
                .unwrap_or(DEFAULT_VOICE);
            let body = SpeechRequest {
                model: TTS_MODEL,
                voice,
                input: &request.text,
                response_format: "mp3",
            };

            tracing::debug!(voice, chars = request.text.chars().count(), "requesting speech");
            let audio = retry_with_backoff(
                &self.retry,
                || self.request_once(&body),
                TtsError::is_retryable,
            )
            .await?;
            tracing::debug!(bytes = audio.bytes.len(), content_type = %audio.content_type, "speech received");
            Ok(audio)
        }
        .boxed()
    }
}
