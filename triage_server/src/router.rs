//! Routes of the HTTP server.
//!
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};

use crate::{
    endpoints::{healthcheck, triage_image},
    inferer::Inferer,
};

/// Largest accepted upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(inferer: Arc<Inferer>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/triage-image", post(triage_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(Extension(inferer))
}
