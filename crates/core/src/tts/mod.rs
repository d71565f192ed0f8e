mod openai;
mod tone;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::util::is_http_retryable;

pub use openai::OpenAiTtsClient;
pub use tone::ToneTtsClient;

pub const MIME_MPEG: &str = "audio/mpeg";
pub const MIME_WAV: &str = "audio/wav";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<VoiceId>,
}

/// Compressed audio exactly as the provider returned it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Bytes,
    pub content_type: String,
}

impl EncodedAudio {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("tts provider not configured: {0}")]
    NotConfigured(&'static str),

    #[error("text must not be empty")]
    EmptyText,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tts failed: {0}")]
    Other(String),
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TtsError::Network(e) => e.is_timeout() || e.is_connect(),
            TtsError::Api { status, .. } => is_http_retryable(*status),
            _ => false,
        }
    }
}

pub trait TtsClient: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<EncodedAudio, TtsError>>;
}
