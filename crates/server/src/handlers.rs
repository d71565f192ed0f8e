use axum::{
    extract::{rejection::JsonRejection, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voice_translator_core::catalog::{find_voice, Voice, DEFAULT_VOICE, VOICES};
use voice_translator_core::config::TargetLang;
use voice_translator_core::diag::DiagReport;
use voice_translator_core::tts::{TtsRequest, VoiceId};

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct VoicesResponse {
    pub voices: &'static [Voice],
}

pub async fn list_voices() -> Json<VoicesResponse> {
    Json(VoicesResponse { voices: &VOICES })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub target_language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translated: String,
}

pub async fn translate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<Json<TranslateResponse>, HttpError> {
    let translator = state
        .translator
        .as_ref()
        .ok_or_else(|| HttpError::NotConfigured("OPENAI_API_KEY missing".to_owned()))?;
    let Json(body) = body?;

    if body.text.trim().is_empty() {
        return Err(HttpError::BadRequest("Invalid parameters".to_owned()));
    }
    let target = TargetLang::new(&body.target_language)
        .map_err(|_| HttpError::BadRequest("Invalid parameters".to_owned()))?;

    let translation = translator.translate(body.text, target).await?;
    Ok(Json(TranslateResponse {
        translated: translation.text,
    }))
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_owned()
}

#[derive(Debug, Deserialize)]
pub struct TtsBody {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
}

pub async fn tts(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TtsBody>, JsonRejection>,
) -> Result<Response, HttpError> {
    let tts = state
        .tts
        .as_ref()
        .ok_or_else(|| HttpError::NotConfigured("OPENAI_API_KEY missing".to_owned()))?;
    let Json(body) = body?;

    if body.text.trim().is_empty() {
        return Err(HttpError::BadRequest("Empty text".to_owned()));
    }
    if find_voice(&body.voice).is_none() {
        tracing::debug!(voice = %body.voice, "voice not in catalog; forwarding as-is");
    }

    let audio = tts
        .synthesize(TtsRequest {
            text: body.text,
            voice: Some(VoiceId(body.voice)),
        })
        .await?;

    Ok((
        [
            (CONTENT_TYPE, audio.content_type),
            (CACHE_CONTROL, "no-store".to_owned()),
        ],
        audio.bytes,
    )
        .into_response())
}

pub async fn diag(State(state): State<Arc<AppState>>) -> Json<DiagReport> {
    Json(state.probe.probe().await)
}
