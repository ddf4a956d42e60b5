//! Progress shown to pollers.
//!
//! Phase checkpoints come from [`JobState::checkpoint`]. The separation call
//! itself reports nothing until it returns, so while a job sits in
//! `separating_stems` this module fills the 30–90 gap with a time-based ramp
//! derived from the audio length. The ramp and the per-stem bars are display
//! estimates only: they do not measure model progress, and all stems come out
//! of a single model pass. If a backend ever exposes real callbacks, replace
//! [`ProgressEstimator::ramp`] and leave the state machine alone.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::job::{JobState, SeparationJob};
use crate::models::separation::{ModelVariant, StemProgress};

/// First value of the separation ramp.
pub const RAMP_START: u8 = 30;

/// The ramp never reaches the `saving_stems` checkpoint on its own.
pub const RAMP_CEILING: u8 = 89;

/// Checkpoint of `saving_stems`; written stems move overall progress up from here.
pub const SAVE_START: u8 = 90;

/// Points each stem bar trails the one before it during separation.
pub const STEM_LAG: u8 = 3;

/// Shortest ramp, so very short inputs still animate.
pub const MIN_EXPECTED_SEPARATION: Duration = Duration::from_secs(5);

/// Overall and per-stem progress at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub overall: u8,
    pub stems: Vec<StemProgress>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressEstimator {
    seconds_per_audio_second: f64,
}

impl ProgressEstimator {
    /// `seconds_per_audio_second` is the expected separation time per second
    /// of input for a cost-factor-1 model. Negative or non-finite rates
    /// count as zero.
    pub fn new(seconds_per_audio_second: f64) -> Self {
        let rate = if seconds_per_audio_second.is_finite() {
            seconds_per_audio_second.max(0.0)
        } else {
            0.0
        };
        Self {
            seconds_per_audio_second: rate,
        }
    }

    /// Expected wall time of the separation call, used to pace the ramp.
    pub fn expected_separation(&self, model: ModelVariant, audio: Duration) -> Duration {
        let secs = audio.as_secs_f64() * self.seconds_per_audio_second * model.cost_factor();
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .max(MIN_EXPECTED_SEPARATION)
    }

    /// Overall percentage for a job snapshot at `now`.
    pub fn overall(&self, job: &SeparationJob, now: DateTime<Utc>) -> u8 {
        match job.state {
            JobState::Queued | JobState::LoadingModel | JobState::LoadingAudio => job.progress,
            JobState::SeparatingStems => match (job.separation_started_at, job.expected_separation)
            {
                (Some(started), Some(expected)) => {
                    job.progress.max(Self::ramp(started, expected, now))
                }
                _ => job.progress,
            },
            JobState::SavingStems => {
                let total = job.model.stems().len().max(1);
                let saved = job.stems_saved.min(total);
                let step = (usize::from(99 - SAVE_START) * saved / total) as u8;
                job.progress.max(SAVE_START + step)
            }
            JobState::Completed => 100,
            JobState::Error => job.progress,
        }
    }

    /// Overall percentage plus one synthetic bar per output stem.
    pub fn snapshot(&self, job: &SeparationJob, now: DateTime<Utc>) -> ProgressSnapshot {
        let overall = self.overall(job, now);
        let stems = job
            .model
            .stems()
            .iter()
            .enumerate()
            .map(|(position, &name)| StemProgress {
                name,
                progress: stem_bar(job, overall, position),
            })
            .collect();

        ProgressSnapshot { overall, stems }
    }

    /// Linear ramp from [`RAMP_START`] toward [`RAMP_CEILING`].
    fn ramp(started: DateTime<Utc>, expected: Duration, now: DateTime<Utc>) -> u8 {
        let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
        let fraction = if expected.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / expected.as_secs_f64()).clamp(0.0, 1.0)
        };
        let span = f64::from(RAMP_CEILING - RAMP_START);
        RAMP_START + (fraction * span).floor() as u8
    }
}

fn stem_bar(job: &SeparationJob, overall: u8, position: usize) -> u8 {
    let lagging = |value: u8| {
        if value < RAMP_START {
            0
        } else {
            let lag = STEM_LAG.saturating_mul(position.min(u8::MAX as usize) as u8);
            value.saturating_sub(lag).max(RAMP_START)
        }
    };

    match job.state {
        JobState::Queued | JobState::LoadingModel | JobState::LoadingAudio => 0,
        JobState::SeparatingStems => lagging(overall),
        JobState::SavingStems => {
            if position < job.stems_saved {
                100
            } else {
                SAVE_START
            }
        }
        JobState::Completed => 100,
        JobState::Error => lagging(overall.min(RAMP_CEILING)),
    }
}
