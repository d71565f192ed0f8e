use axum::extract::rejection::JsonRejection;
use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use voice_translator_core::translate::TranslateError;
use voice_translator_core::tts::TtsError;

use crate::middleware::RATE_LIMIT_REMAINING;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A provider key or client is missing from the server configuration.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            HttpError::NotConfigured(_) | HttpError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            HttpError::BadRequest(msg) | HttpError::NotConfigured(msg) | HttpError::Internal(msg) => {
                msg.clone()
            }
            HttpError::TooManyRequests { .. } => "Too many requests, try again later".to_owned(),
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };
        let mut response = (status, axum::Json(body)).into_response();

        if let HttpError::TooManyRequests { retry_after_secs } = self {
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        }
        response
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        HttpError::BadRequest("Invalid request body".to_owned())
    }
}

impl From<TranslateError> for HttpError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::EmptyText => HttpError::BadRequest("text must not be empty".to_owned()),
            TranslateError::NotConfigured(what) => HttpError::NotConfigured(format!("{what} missing")),
            other => {
                tracing::error!(error = %other, "translation failed");
                HttpError::Internal("Translation failed".to_owned())
            }
        }
    }
}

impl From<TtsError> for HttpError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::EmptyText => HttpError::BadRequest("text must not be empty".to_owned()),
            TtsError::NotConfigured(what) => HttpError::NotConfigured(format!("{what} missing")),
            other => {
                tracing::error!(error = %other, "speech synthesis failed");
                HttpError::Internal("Failed to generate audio".to_owned())
            }
        }
    }
}
