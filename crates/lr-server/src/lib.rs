//! Axum HTTP surface for the security gateway: the `/health` and
//! `/v1/chat/completions` routes, and the request pipeline that the
//! latter drives through authentication, rate limiting, the two
//! content scanners, provider dispatch, and response scanning.

pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the full router over a ready [`AppState`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/chat/completions", post(routes::chat_completions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
