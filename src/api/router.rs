//! HTTP API router.
//!
//! Returns a composable `Router` with all routes under `/api/`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::pipeline::analysis::MAX_DOCUMENT_BYTES;

/// Largest accepted request body: a maximal document in base64 plus JSON framing.
pub const MAX_REQUEST_BYTES: usize = MAX_DOCUMENT_BYTES / 3 * 4 + 64 * 1024;

pub fn api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::analyze))
        .route("/metrics", post(endpoints::analyze::metrics))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(CorsLayer::permissive())
}
