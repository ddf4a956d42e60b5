use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobState;
use crate::models::separation::{
    ErrorResponse, JobStatusResponse, ModelInfo, ModelVariant, SubmitResponse,
};
use crate::services::storage::StorageError;
use crate::services::submission::{SubmitError, Submission, ValidationError};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// POST /api/upload — Upload an audio file for separation.
///
/// Multipart fields: `file` or `audio_file` (required), `model`, `output_directory`.
pub async fn submit_separation(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut model: Option<String> = None;
    let mut output_directory: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "audio_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(e.status(), e.body_text()))?;
                upload = Some((filename, data.to_vec()));
            }
            "model" => {
                model = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| api_error(e.status(), e.body_text()))?,
                );
            }
            "output_directory" => {
                output_directory = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| api_error(e.status(), e.body_text()))?,
                );
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No file provided"))?;

    let submission = Submission {
        bytes,
        filename,
        model,
        output_directory,
    };

    // Staging writes the whole upload to disk
    let gateway = state.submissions.clone();
    let job_id = tokio::task::spawn_blocking(move || gateway.submit(submission))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(submit_error)?;

    Ok(Json(SubmitResponse {
        job_id,
        status: JobState::Queued,
        message: "File uploaded successfully, processing started".to_string(),
    }))
}

fn submit_error(err: SubmitError) -> ApiError {
    let status = match &err {
        SubmitError::Invalid(ValidationError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        SubmitError::Invalid(ValidationError::InvalidFormat(_)) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        SubmitError::Invalid(_) => StatusCode::BAD_REQUEST,
        SubmitError::Staging(_) | SubmitError::Registry(_) => {
            tracing::error!(error = %err, "Submission failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

/// Ids that are not UUIDs can never name a job.
fn parse_job_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, not_found))
}

/// GET /api/status/{job_id} — Check separation job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = parse_job_id(&job_id, "Job not found")?;
    state
        .status
        .get_status(job_id)
        .map(Json)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))
}

/// GET /api/jobs — Status of every job since startup.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatusResponse>> {
    Json(state.status.list())
}

/// GET /api/download/{job_id}/{stem_name} — Download one stem as WAV.
pub async fn download_stem(
    State(state): State<AppState>,
    Path((job_id, stem_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id, "File not found")?;
    let status = state.status.clone();
    let download = tokio::task::spawn_blocking(move || status.fetch_stem(job_id, &stem_name))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| match e {
            StorageError::NotFound { .. } => api_error(StatusCode::NOT_FOUND, "File not found"),
            other => {
                tracing::error!(job_id = %job_id, error = %other, "Download failed");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

/// GET /api/models — Catalogue of separation models.
pub async fn available_models() -> Json<Vec<ModelInfo>> {
    Json(ModelVariant::iter().map(ModelInfo::from).collect())
}
