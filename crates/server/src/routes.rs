use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::throttle_middleware;
use crate::state::AppState;

/// Builds the `/api` router. Only the endpoints that spend provider credit
/// go through the throttle.
pub fn create_router(state: Arc<AppState>) -> Router {
    let throttled = Router::new()
        .route("/translate", post(handlers::translate))
        .route("/tts", post(handlers::tts))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_middleware,
        ));

    let open = Router::new()
        .route("/voices", get(handlers::list_voices))
        .route("/diag", get(handlers::diag));

    Router::new()
        .nest("/api", open.merge(throttled))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
