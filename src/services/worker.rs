use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tempfile::TempPath;
use uuid::Uuid;

use crate::models::job::{JobError, JobState, SeparationJob, StemFile};
use crate::services::codec::{self, CodecError};
use crate::services::model_cache::ModelCache;
use crate::services::progress::ProgressEstimator;
use crate::services::registry::JobHandle;
use crate::services::separator::BackendError;
use crate::services::storage::{ArtifactStore, StorageError};

/// One dispatched job: the handle to mutate and the uploaded input it owns.
///
/// The input file is deleted when the task is dropped.
pub struct JobTask {
    handle: JobHandle,
    input: TempPath,
}

impl JobTask {
    pub fn new(handle: JobHandle, input: TempPath) -> Self {
        Self { handle, input }
    }

    pub fn job_id(&self) -> Uuid {
        self.handle.id()
    }
}

/// Hands tasks to something that will run them.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: JobTask) -> io::Result<()>;
}

/// Runs every job on its own named OS thread.
pub struct ThreadDispatcher {
    worker: Arc<Worker>,
}

impl ThreadDispatcher {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, task: JobTask) -> io::Result<()> {
        let worker = Arc::clone(&self.worker);
        thread::Builder::new()
            .name(format!("stem-job-{}", task.job_id()))
            .spawn(move || worker.run(task))?;
        Ok(())
    }
}

/// Runs the job on the caller's thread before returning.
pub struct InlineDispatcher {
    worker: Arc<Worker>,
}

impl InlineDispatcher {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: JobTask) -> io::Result<()> {
        self.worker.run(task);
        Ok(())
    }
}

/// Executes the separation pipeline for one job at a time.
///
/// A worker only talks to the outside world through the job handle: failures
/// are recorded on the job and never returned to the submitter.
pub struct Worker {
    models: Arc<ModelCache>,
    estimator: ProgressEstimator,
}

impl Worker {
    pub fn new(models: Arc<ModelCache>, estimator: ProgressEstimator) -> Self {
        Self { models, estimator }
    }

    /// Drive the job to a terminal state.
    pub fn run(&self, task: JobTask) {
        let JobTask { handle, input } = task;
        let job = handle.snapshot();
        let start = Instant::now();

        tracing::info!(
            job_id = %job.id,
            model = %job.model,
            filename = %job.filename,
            "Starting separation job"
        );
        metrics::gauge!("separation_jobs_active").increment(1.0);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(&handle, &job, &input)
        }))
        .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));

        match outcome {
            Ok(stems) => {
                metrics::counter!("separation_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    stems = stems.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Separation job completed"
                );
            }
            Err(e) => {
                metrics::counter!("separation_jobs_failed").increment(1);
                tracing::error!(job_id = %job.id, error = %e, "Separation job failed");
                if let Err(cleanup) = ArtifactStore::new(&job.output_directory).discard(job.id) {
                    tracing::warn!(job_id = %job.id, error = %cleanup, "Failed to remove staged stems");
                }
                self.record_failure(&handle, &e);
            }
        }

        metrics::histogram!("separation_processing_seconds").record(start.elapsed().as_secs_f64());
        metrics::gauge!("separation_jobs_active").decrement(1.0);

        if let Err(e) = input.close() {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to remove uploaded input");
        }
    }

    fn execute(
        &self,
        handle: &JobHandle,
        job: &SeparationJob,
        input: &Path,
    ) -> Result<Vec<StemFile>, PipelineError> {
        handle.update(|j| j.advance(JobState::LoadingModel))?;
        let model = self
            .models
            .acquire(job.model)
            .map_err(PipelineError::ModelLoad)?;

        handle.update(|j| j.advance(JobState::LoadingAudio))?;
        let audio = codec::decode_file(input).map_err(PipelineError::Decode)?;
        tracing::info!(
            job_id = %job.id,
            channels = audio.channel_count(),
            sample_rate = audio.sample_rate(),
            seconds = audio.duration().as_secs_f64(),
            "Input decoded"
        );

        let expected = self
            .estimator
            .expected_separation(job.model, audio.duration());
        handle.update(|j| j.begin_separation(Utc::now(), expected))?;
        let mut separated = model.separate(&audio).map_err(PipelineError::Separation)?;
        drop(audio);

        handle.update(|j| j.advance(JobState::SavingStems))?;
        let store = ArtifactStore::new(&job.output_directory);
        let mut stems = Vec::with_capacity(job.model.stems().len());
        for &name in job.model.stems() {
            let buffer = separated
                .remove(&name)
                .ok_or(PipelineError::Separation(BackendError::MissingStem(name)))?;
            let relative_path = store
                .write(job.id, name, &buffer)
                .map_err(PipelineError::Write)?;
            handle.update(|j| j.mark_stem_saved());
            stems.push(StemFile {
                name,
                relative_path,
            });
        }

        store.publish(job.id).map_err(PipelineError::Write)?;
        handle.update(|j| j.complete(stems.clone()))?;
        Ok(stems)
    }

    fn record_failure(&self, handle: &JobHandle, error: &PipelineError) {
        let estimator = self.estimator;
        let recorded = handle.update(|job| {
            let shown = estimator.overall(job, Utc::now());
            job.fail(error.to_string(), shown)
        });
        if let Err(e) = recorded {
            tracing::error!(job_id = %handle.id(), error = %e, "Could not record job failure");
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

/// Failures inside the pipeline. Recorded on the job, never returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Model load failed: {0}")]
    ModelLoad(#[source] BackendError),

    #[error("Could not decode input audio: {0}")]
    Decode(#[source] CodecError),

    #[error("Separation failed: {0}")]
    Separation(#[source] BackendError),

    #[error("Could not write stems: {0}")]
    Write(#[source] StorageError),

    #[error("Separation worker crashed: {0}")]
    Panicked(String),

    #[error(transparent)]
    State(#[from] JobError),
}
