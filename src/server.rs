//! HTTP router for the recognition service.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::pipeline::Engine;
use crate::routes;

/// Uploads are whole songs; allow a generous body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(|| async { "healthy" }))
        .route("/songs", post(routes::register))
        .route("/songs/:id", delete(routes::remove))
        .route("/stats", get(routes::stats))
        .route("/recognize", post(routes::recognize))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(engine)
}
