use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use garde::Validate;
use uuid::Uuid;

use crate::models::job::SeparationJob;
use crate::models::separation::ModelVariant;
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::worker::{Dispatcher, JobTask};

/// Upload extensions accepted for separation.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "aac", "ogg"];

/// Default upload ceiling: 500 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// An incoming separation request.
#[derive(Debug, Validate)]
pub struct Submission {
    #[garde(skip)]
    pub bytes: Vec<u8>,

    #[garde(length(chars, min = 1, max = 255))]
    pub filename: String,

    /// Model name or alias; `None` selects the default model.
    #[garde(skip)]
    pub model: Option<String>,

    #[garde(length(max = 4096))]
    pub output_directory: Option<String>,
}

/// Validates requests, registers jobs and hands them to a dispatcher.
pub struct SubmissionGateway {
    registry: Arc<JobRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    upload_dir: PathBuf,
    default_output: PathBuf,
    max_upload_bytes: u64,
}

impl SubmissionGateway {
    pub fn new(
        registry: Arc<JobRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        upload_dir: PathBuf,
        default_output: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            upload_dir,
            default_output,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Accept a submission and return its job id without waiting for separation.
    ///
    /// Rejected submissions never create a job.
    pub fn submit(&self, submission: Submission) -> Result<Uuid, SubmitError> {
        let model = self.validate(&submission).inspect_err(|e| {
            metrics::counter!("separation_submissions_rejected").increment(1);
            tracing::warn!(filename = %submission.filename, error = %e, "Submission rejected");
        })?;

        let Submission {
            bytes,
            filename,
            output_directory,
            ..
        } = submission;
        let output_directory = self.resolve_output(output_directory.as_deref());
        let extension = extension_of(&filename).unwrap_or_default();
        let input = self.stage_upload(&bytes, &extension).map_err(SubmitError::Staging)?;
        drop(bytes);

        let job = SeparationJob::new(
            Uuid::new_v4(),
            model,
            filename,
            input.to_path_buf(),
            output_directory,
        );
        let job_id = job.id;
        let handle = self.registry.create(job)?;

        tracing::info!(
            job_id = %job_id,
            model = %model,
            output = %handle.snapshot().output_directory.display(),
            "Job queued"
        );
        metrics::counter!("separation_jobs_total").increment(1);

        if let Err(e) = self.dispatcher.dispatch(JobTask::new(handle.clone(), input)) {
            tracing::error!(job_id = %job_id, error = %e, "Failed to start worker");
            let recorded = handle.update(|job| {
                let frozen = job.progress;
                job.fail(format!("Worker could not be started: {e}"), frozen)
            });
            if let Err(e) = recorded {
                tracing::error!(job_id = %job_id, error = %e, "Could not record job failure");
            }
        }

        Ok(job_id)
    }

    fn validate(&self, submission: &Submission) -> Result<ModelVariant, ValidationError> {
        submission
            .validate()
            .map_err(|report| ValidationError::InvalidFilename(report.to_string()))?;

        let extension = extension_of(&submission.filename)
            .ok_or_else(|| ValidationError::InvalidFormat(submission.filename.clone()))?;
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::InvalidFormat(submission.filename.clone()));
        }

        let size = submission.bytes.len() as u64;
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_upload_bytes {
            return Err(ValidationError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        parse_model(submission.model.as_deref())
    }

    fn resolve_output(&self, requested: Option<&str>) -> PathBuf {
        match requested.map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.default_output.clone(),
        }
    }

    fn stage_upload(&self, bytes: &[u8], extension: &str) -> io::Result<tempfile::TempPath> {
        std::fs::create_dir_all(&self.upload_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("stem-upload-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(&self.upload_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }
}

/// Parse a model choice; an absent or blank choice selects the default model.
pub fn parse_model(choice: Option<&str>) -> Result<ModelVariant, ValidationError> {
    match choice.map(str::trim) {
        None | Some("") => Ok(ModelVariant::default()),
        Some(name) => name
            .parse()
            .map_err(|_| ValidationError::UnknownModel(name.to_string())),
    }
}

/// Lowercased extension of a declared filename.
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Reasons a submission is refused before any job exists.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Unsupported file format: {0} (expected one of mp3, wav, flac, m4a, aac, ogg)")]
    InvalidFormat(String),

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Failed to stage upload: {0}")]
    Staging(#[source] io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
