use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Reference images are sent inline; allow more than axum's 2 MiB default.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// ```text
/// POST /generate-video   -> generate_video
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate-video", post(generation::generate_video))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
