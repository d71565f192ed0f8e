//! Provider key and reachability diagnostics.

use crate::config::ProviderConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagReport {
    pub has_key: bool,
    pub models_ok: bool,
    pub error: Option<DiagFailure>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagFailure {
    pub message: String,
    pub status: Option<u16>,
}

pub trait HealthProbe: Send + Sync {
    /// Never fails: problems are reported inside the [`DiagReport`].
    fn probe(&self) -> BoxFuture<'_, DiagReport>;
}

/// Checks the configured key by listing the provider's models.
#[derive(Clone)]
pub struct OpenAiHealthProbe {
    client: Client,
    provider: ProviderConfig,
}

impl OpenAiHealthProbe {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            provider,
        }
    }

    fn has_key(&self) -> bool {
        self.provider
            .api_key
            .as_ref()
            .is_some_and(|k| k.expose().starts_with("sk-"))
    }

    async fn list_models(&self) -> Result<bool, DiagFailure> {
        let key = self.provider.api_key.as_ref().ok_or_else(|| DiagFailure {
            message: "OPENAI_API_KEY missing".to_owned(),
            status: None,
        })?;
        let url = self.provider.endpoint("models").map_err(|e| DiagFailure {
            message: e.to_string(),
            status: None,
        })?;
        let response = self
            .client
            .get(url)
            .bearer_auth(key.expose())
            .send()
            .await
            .map_err(|e| DiagFailure {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiagFailure {
                message: format!("models listing returned HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }
        let models: ModelList = response.json().await.map_err(|e| DiagFailure {
            message: format!("failed to parse models listing: {e}"),
            status: Some(status.as_u16()),
        })?;
        Ok(!models.data.is_empty())
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl HealthProbe for OpenAiHealthProbe {
    fn probe(&self) -> BoxFuture<'_, DiagReport> {
        async move {
            let has_key = self.has_key();
            if !has_key {
                return DiagReport {
                    has_key,
                    models_ok: false,
                    error: None,
                };
            }
            match self.list_models().await {
                Ok(models_ok) => DiagReport {
                    has_key,
                    models_ok,
                    error: None,
                },
                Err(failure) => {
                    tracing::warn!(error = %failure.message, status = ?failure.status, "provider diagnostics failed");
                    DiagReport {
                        has_key,
                        models_ok: false,
                        error: Some(failure),
                    }
                }
            }
        }
        .boxed()
    }
}
