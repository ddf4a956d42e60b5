use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::job::SeparationJob;

/// Write access to one job, held by the worker that owns it.
#[derive(Clone, Debug)]
pub struct JobHandle {
    id: Uuid,
    job: Arc<Mutex<SeparationJob>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> SeparationJob {
        self.job.lock().clone()
    }

    /// Mutate the job inside its critical section.
    pub fn update<R>(&self, f: impl FnOnce(&mut SeparationJob) -> R) -> R {
        f(&mut self.job.lock())
    }
}

/// In-memory registry of every job submitted since process start.
///
/// The map lock is only held to insert or look up a job; field reads and
/// writes go through the per-job mutex, so status polls and the owning worker
/// contend for a single short critical section. Readers get clones.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job and return the handle its worker will mutate.
    pub fn create(&self, job: SeparationJob) -> Result<JobHandle, RegistryError> {
        let id = job.id;
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        let handle = JobHandle {
            id,
            job: Arc::new(Mutex::new(job)),
        };
        jobs.insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<SeparationJob, RegistryError> {
        let handle = self
            .jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))?;
        Ok(handle.snapshot())
    }

    /// Snapshots of all jobs, newest first.
    pub fn list(&self) -> Vec<SeparationJob> {
        let handles: Vec<JobHandle> = self.jobs.read().values().cloned().collect();
        let mut jobs: Vec<SeparationJob> = handles.iter().map(JobHandle::snapshot).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already registered")]
    Duplicate(Uuid),
}
