use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::HttpError;
use crate::state::AppState;

pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

const UNKNOWN_CLIENT: &str = "0.0.0.0";

/// Throttle key for a request: the first `x-forwarded-for` hop, else
/// `x-real-ip`, else a shared placeholder.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_owned()
}

/// Rejects over-limit clients with 429 before the handler (and its provider
/// call) runs; admitted responses report the remaining budget.
pub async fn throttle_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(request.headers());
    let decision = state.throttle.check(&key);

    if !decision.allowed {
        tracing::warn!(
            client = %key,
            path = %request.uri().path(),
            reset_in_ms = decision.reset_in_ms,
            "rejecting request: rate limit reached"
        );
        return HttpError::TooManyRequests {
            retry_after_secs: decision.reset_in_ms.div_ceil(1000),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let h = headers(&[
            ("x-forwarded-for", " 203.0.113.9 , 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_key(&h), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_real_ip_then_placeholder() {
        assert_eq!(
            client_key(&headers(&[("x-real-ip", "198.51.100.2")])),
            "198.51.100.2"
        );
        assert_eq!(
            client_key(&headers(&[("x-forwarded-for", " "), ("x-real-ip", "198.51.100.2")])),
            "198.51.100.2"
        );
        assert_eq!(client_key(&HeaderMap::new()), "0.0.0.0");
    }
}
