pub mod health;
pub mod metrics;
pub mod separate;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

/// Room for multipart framing on top of the upload ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// API routes; the upload ceiling comes from the submission gateway.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.submissions.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/models", get(separate::available_models))
        .route("/api/upload", post(separate::submit_separation))
        .route("/api/jobs", get(separate::list_jobs))
        .route("/api/status/{job_id}", get(separate::get_job_status))
        .route(
            "/api/download/{job_id}/{stem_name}",
            get(separate::download_stem),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
