use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::models::separation::{ModelVariant, StemName};

/// Lifecycle phase of a separation job.
///
/// ```text
/// queued ─► loading_model ─► loading_audio ─► separating_stems ─► saving_stems ─► completed
///    │            │                │                 │                 │
///    └────────────┴────────────────┴─────────────────┴─────────────────┴──► error
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Queued,
    LoadingModel,
    LoadingAudio,
    SeparatingStems,
    SavingStems,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// The phase entered when this one finishes successfully.
    pub fn successor(self) -> Option<JobState> {
        match self {
            JobState::Queued => Some(JobState::LoadingModel),
            JobState::LoadingModel => Some(JobState::LoadingAudio),
            JobState::LoadingAudio => Some(JobState::SeparatingStems),
            JobState::SeparatingStems => Some(JobState::SavingStems),
            JobState::SavingStems => Some(JobState::Completed),
            JobState::Completed | JobState::Error => None,
        }
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        match next {
            JobState::Error => !self.is_terminal(),
            _ => self.successor() == Some(next),
        }
    }

    /// Progress checkpoint recorded when a phase is entered.
    ///
    /// `Error` has no checkpoint of its own; a failed job keeps the value it
    /// had when it failed.
    pub fn checkpoint(self) -> Option<u8> {
        match self {
            JobState::Queued => Some(0),
            JobState::LoadingModel => Some(10),
            JobState::LoadingAudio => Some(20),
            JobState::SeparatingStems => Some(30),
            JobState::SavingStems => Some(90),
            JobState::Completed => Some(100),
            JobState::Error => None,
        }
    }
}

/// A stem written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemFile {
    pub name: StemName,
    /// Path relative to the job's output directory, e.g. `<job_id>/vocals.wav`.
    pub relative_path: String,
}

/// A stem separation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationJob {
    pub id: Uuid,
    pub state: JobState,
    pub progress: u8,
    pub model: ModelVariant,
    /// Name the file was uploaded under.
    pub filename: String,
    pub input_path: PathBuf,
    pub output_directory: PathBuf,
    pub stems: Vec<StemFile>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    // Inputs for the synthetic separation ramp
    pub separation_started_at: Option<DateTime<Utc>>,
    pub expected_separation: Option<Duration>,

    /// Stems written so far while in `saving_stems`.
    pub stems_saved: usize,
}

impl SeparationJob {
    pub fn new(
        id: Uuid,
        model: ModelVariant,
        filename: impl Into<String>,
        input_path: PathBuf,
        output_directory: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            model,
            filename: filename.into(),
            input_path,
            output_directory,
            stems: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            separation_started_at: None,
            expected_separation: None,
            stems_saved: 0,
        }
    }

    /// Move to the next pipeline phase.
    ///
    /// `separating_stems` and `completed` carry extra data and are entered
    /// through [`begin_separation`](Self::begin_separation) and
    /// [`complete`](Self::complete) instead.
    pub fn advance(&mut self, next: JobState) -> Result<(), JobError> {
        match next {
            JobState::SeparatingStems | JobState::Completed | JobState::Error => {
                Err(self.illegal(next))
            }
            _ => self.enter(next),
        }
    }

    pub fn begin_separation(
        &mut self,
        started_at: DateTime<Utc>,
        expected: Duration,
    ) -> Result<(), JobError> {
        self.enter(JobState::SeparatingStems)?;
        self.separation_started_at = Some(started_at);
        self.expected_separation = Some(expected);
        Ok(())
    }

    pub fn mark_stem_saved(&mut self) {
        if self.state == JobState::SavingStems {
            self.stems_saved += 1;
            self.updated_at = Utc::now();
        }
    }

    pub fn complete(&mut self, stems: Vec<StemFile>) -> Result<(), JobError> {
        if stems.is_empty() {
            return Err(JobError::NoStems(self.id));
        }
        self.enter(JobState::Completed)?;
        self.stems = stems;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Record a failure. `progress` is the value last shown to pollers and is
    /// frozen on the job.
    pub fn fail(&mut self, message: impl Into<String>, progress: u8) -> Result<(), JobError> {
        if !self.state.can_transition_to(JobState::Error) {
            return Err(self.illegal(JobState::Error));
        }
        let message = message.into();
        self.state = JobState::Error;
        self.progress = self.progress.max(progress.min(99));
        self.error = Some(if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
        self.stems.clear();
        self.updated_at = Utc::now();
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    fn enter(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(self.illegal(next));
        }
        self.state = next;
        if let Some(checkpoint) = next.checkpoint() {
            self.progress = self.progress.max(checkpoint);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn illegal(&self, to: JobState) -> JobError {
        JobError::IllegalTransition {
            job_id: self.id,
            from: self.state,
            to,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JobError {
    #[error("Job {job_id}: illegal transition from {from} to {to}")]
    IllegalTransition {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },

    #[error("Job {0}: cannot complete without stems")]
    NoStems(Uuid),
}
