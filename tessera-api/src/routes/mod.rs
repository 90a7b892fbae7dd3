//! HTTP Routes Module
//!
//! - KV endpoints under `/v1/:tenant/:key`
//! - Health checks under `/health`
//! - Prometheus scrape endpoint at `/metrics`

pub mod health;
pub mod kv;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::constants::MAX_REQUEST_BODY_BYTES;
use crate::state::AppState;
use crate::telemetry::metrics_handler;

pub use health::create_router as health_router;
pub use kv::create_router as kv_router;

/// Build the complete application router.
///
/// Requests are logged by `TraceLayer`; a panicking handler becomes a 500
/// response instead of tearing down the connection.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/v1", kv_router())
        .nest("/health", health_router())
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
