//! HTTP front for the translator: voice catalog, translation, synthesis and
//! provider diagnostics, with per-client throttling on the paid endpoints.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::HttpError;
pub use routes::create_router;
pub use state::{spawn_reaper, AppState};
