//! Router for the gateway.
//!
//! ## Structure
//! - `GET /health`, `GET /readyz` — health checks, matched before storage routing
//! - everything else — handed to the storage dispatcher, which parses
//!   `/{bucket}/{key...}` itself and answers 405 for unsupported methods
//!
//! Keys may be nested (`photos/2025/img.jpg`); the first path segment is
//! always the bucket.

use crate::{
    handlers::{
        health_handlers::{health, readyz},
        s3_handlers::dispatch,
    },
    services::storage_service::StorageService,
};
use axum::{Router, routing::get};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Build the router for all routes, without state.
pub fn routes() -> Router<StorageService> {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .fallback(dispatch)
}

/// Routes bound to a storage backend, wrapped in request tracing.
///
/// Every request is logged at INFO with method, path, status and latency.
pub fn app(service: StorageService) -> Router {
    routes().with_state(service).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}
