use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe the job metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("separation_jobs_total", "Separation jobs accepted");
    metrics::describe_counter!(
        "separation_jobs_completed",
        "Separation jobs that produced all stems"
    );
    metrics::describe_counter!("separation_jobs_failed", "Separation jobs that ended in error");
    metrics::describe_counter!(
        "separation_submissions_rejected",
        "Uploads refused before a job was created"
    );
    metrics::describe_histogram!(
        "separation_processing_seconds",
        "Wall time from worker start to terminal state"
    );
    metrics::describe_gauge!("separation_jobs_active", "Jobs currently running on a worker");

    Ok(handle)
}

/// GET /metrics — Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
