mod dummy;
mod openai;

use crate::config::{ConfigError, TargetLang};
use crate::util::is_http_retryable;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use dummy::DummyTranslator;
pub use openai::OpenAiTranslator;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("translation provider not configured: {0}")]
    NotConfigured(&'static str),

    #[error("text must not be empty")]
    EmptyText,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TranslateError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslateError::Network(e) => e.is_timeout() || e.is_connect(),
            TranslateError::Api { status, .. } => is_http_retryable(*status),
            _ => false,
        }
    }
}

pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: String,
        target: TargetLang,
    ) -> BoxFuture<'_, Result<Translation, TranslateError>>;
}
