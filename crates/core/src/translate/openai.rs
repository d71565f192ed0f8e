use crate::config::{ApiKey, ProviderConfig, TargetLang};
use crate::translate::{TranslateError, Translation, Translator};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CHAT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 400;

/// Translation through an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiTranslator {
    client: Client,
    api_key: ApiKey,
    provider: ProviderConfig,
    retry: RetryConfig,
}

impl OpenAiTranslator {
    pub fn new(provider: ProviderConfig) -> Result<Self, TranslateError> {
        let api_key = provider
            .api_key
            .clone()
            .ok_or(TranslateError::NotConfigured("OPENAI_API_KEY missing"))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            provider,
            retry: RetryConfig::default(),
        })
    }

    async fn request_once(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, TranslateError> {
        let url = self.provider.endpoint("chat/completions")?;
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
            return Err(TranslateError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| TranslateError::InvalidResponse(format!("failed to parse JSON: {e}")))
    }
}

fn system_prompt(target: &TargetLang) -> String {
    format!(
        "You are a professional translator. Translate the user's text into {}.\n\
         Reply ONLY with the translated text, without quotes or explanations.",
        target.as_str()
    )
}

/// First non-blank completion, or `original` when the provider returned nothing usable.
fn extract_translation(response: ChatResponse, original: String) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
        .unwrap_or(original)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

impl Translator for OpenAiTranslator {
    fn translate(
        &self,
        text: String,
        target: TargetLang,
    ) -> BoxFuture<'_, Result<Translation, TranslateError>> {
        async move {
            if text.trim().is_empty() {
                return Err(TranslateError::EmptyText);
            }
            let system = system_prompt(&target);
            let body = ChatRequest {
                model: CHAT_MODEL,
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: &system,
                    },
                    ChatMessage {
                        role: "user",
                        content: &text,
                    },
                ],
            };

            tracing::debug!(
                target_lang = %target.as_str(),
                chars = text.chars().count(),
                "requesting translation"
            );
            let response = retry_with_backoff(
                &self.retry,
                || self.request_once(&body),
                TranslateError::is_retryable,
            )
            .await?;

            Ok(Translation {
                text: extract_translation(response, text),
            })
        }
        .boxed()
    }
}
