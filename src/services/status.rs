use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{JobState, SeparationJob};
use crate::models::separation::JobStatusResponse;
use crate::services::progress::ProgressEstimator;
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::storage::{ArtifactStore, StorageError, STEM_EXTENSION};

/// Bytes of a stem ready to be sent to a client.
#[derive(Debug)]
pub struct StemDownload {
    pub bytes: Vec<u8>,
    /// Suggested attachment name, e.g. `song_vocals.wav`.
    pub file_name: String,
}

/// Read-only queries over the registry and the artifact store.
pub struct StatusGateway {
    registry: Arc<JobRegistry>,
    estimator: ProgressEstimator,
    default_store: ArtifactStore,
}

impl StatusGateway {
    pub fn new(
        registry: Arc<JobRegistry>,
        estimator: ProgressEstimator,
        default_store: ArtifactStore,
    ) -> Self {
        Self {
            registry,
            estimator,
            default_store,
        }
    }

    pub fn get_status(&self, job_id: Uuid) -> Result<JobStatusResponse, RegistryError> {
        let job = self.registry.get(job_id)?;
        Ok(self.view(job, Utc::now()))
    }

    /// Status of every job, newest first.
    pub fn list(&self) -> Vec<JobStatusResponse> {
        let now = Utc::now();
        self.registry
            .list()
            .into_iter()
            .map(|job| self.view(job, now))
            .collect()
    }

    fn view(&self, job: SeparationJob, now: DateTime<Utc>) -> JobStatusResponse {
        let progress = self.estimator.snapshot(&job, now);
        JobStatusResponse {
            job_id: job.id,
            status: job.state,
            progress: progress.overall,
            model: job.model,
            filename: job.filename,
            stems: job.stems,
            stem_progress: progress.stems,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }

    /// Fetch a stem of a completed job.
    ///
    /// Job ids the registry does not know (e.g. from before a restart) are
    /// looked up in the default output root, which outlives the process.
    pub fn fetch_stem(&self, job_id: Uuid, stem_name: &str) -> Result<StemDownload, StorageError> {
        let not_found = || StorageError::NotFound {
            job_id,
            stem: stem_name.to_string(),
        };

        match self.registry.get(job_id) {
            Ok(job) => {
                if job.state != JobState::Completed {
                    return Err(not_found());
                }
                let stem = job
                    .stems
                    .iter()
                    .find(|s| s.name.to_string() == stem_name)
                    .ok_or_else(not_found)?;

                let bytes = ArtifactStore::new(&job.output_directory).read(job_id, stem_name)?;
                let base = Path::new(&job.filename)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("audio");

                Ok(StemDownload {
                    bytes,
                    file_name: format!("{base}_{}.{STEM_EXTENSION}", stem.name),
                })
            }
            Err(RegistryError::NotFound(_)) => {
                let bytes = self.default_store.read(job_id, stem_name)?;
                Ok(StemDownload {
                    bytes,
                    file_name: format!("{stem_name}.{STEM_EXTENSION}"),
                })
            }
            Err(RegistryError::Duplicate(_)) => Err(not_found()),
        }
    }
}
