//! Shared fixtures: an in-process separation backend and WAV generators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use stem_splitter::app_state::AppState;
use stem_splitter::config::AppConfig;
use stem_splitter::models::audio::AudioBuffer;
use stem_splitter::models::separation::{JobStatusResponse, ModelVariant, StemName};
use stem_splitter::services::model_cache::ModelCache;
use stem_splitter::services::progress::ProgressEstimator;
use stem_splitter::services::separator::{BackendError, SeparationBackend, SeparationModel};
use stem_splitter::services::worker::{Dispatcher, JobTask, Worker};
use tempfile::TempDir;
use uuid::Uuid;

/// Backend whose models split audio by scaling it per stem.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    loads: AtomicUsize,
    separations: AtomicUsize,
    fail_load: bool,
    fail_separation: bool,
    omit_stem: Option<StemName>,
    separation_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every separation call fails.
    pub fn failing() -> Self {
        Self {
            inner: Arc::new(FakeState {
                fail_separation: true,
                ..FakeState::default()
            }),
        }
    }

    /// Every model load fails.
    pub fn failing_load() -> Self {
        Self {
            inner: Arc::new(FakeState {
                fail_load: true,
                ..FakeState::default()
            }),
        }
    }

    /// Separation succeeds but never returns `stem`.
    pub fn omitting(stem: StemName) -> Self {
        Self {
            inner: Arc::new(FakeState {
                omit_stem: Some(stem),
                ..FakeState::default()
            }),
        }
    }

    /// Separation blocks for `delay` before returning.
    pub fn slow(delay: Duration) -> Self {
        Self {
            inner: Arc::new(FakeState {
                separation_delay: delay,
                ..FakeState::default()
            }),
        }
    }

    pub fn loads(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    pub fn separations(&self) -> usize {
        self.inner.separations.load(Ordering::SeqCst)
    }
}

impl SeparationBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn load(&self, variant: ModelVariant) -> Result<Arc<dyn SeparationModel>, BackendError> {
        self.inner.loads.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_load {
            return Err(BackendError::Model("weights unavailable".to_string()));
        }
        Ok(Arc::new(FakeModel {
            variant,
            state: Arc::clone(&self.inner),
        }))
    }
}

struct FakeModel {
    variant: ModelVariant,
    state: Arc<FakeState>,
}

impl SeparationModel for FakeModel {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<HashMap<StemName, AudioBuffer>, BackendError> {
        self.state.separations.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.state.separation_delay);
        if self.state.fail_separation {
            return Err(BackendError::Model("simulated inference crash".to_string()));
        }

        Ok(self
            .variant
            .stems()
            .iter()
            .enumerate()
            .filter(|&(_, &stem)| Some(stem) != self.state.omit_stem)
            .map(|(i, &stem)| {
                let gain = 1.0 / (i as f32 + 2.0);
                let channels = audio
                    .channels()
                    .iter()
                    .map(|ch| ch.iter().map(|s| s * gain).collect())
                    .collect();
                (stem, AudioBuffer::new(channels, audio.sample_rate()))
            })
            .collect())
    }
}

/// Keeps dispatched tasks until the test releases them.
#[derive(Default)]
pub struct HeldDispatcher {
    tasks: Mutex<Vec<JobTask>>,
}

impl HeldDispatcher {
    pub fn take(&self) -> Vec<JobTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap())
    }
}

impl Dispatcher for HeldDispatcher {
    fn dispatch(&self, task: JobTask) -> io::Result<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: AppConfig,
    pub state: AppState,
    pub backend: FakeBackend,
}

impl Harness {
    pub fn output_root(&self) -> std::path::PathBuf {
        self.config.output_root.clone()
    }
}

fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::with_output_root(dir.path().join("outputs"));
    config.upload_dir = Some(dir.path().join("uploads"));
    config
}

/// Application state with thread-per-job workers over `backend`.
pub fn harness(backend: FakeBackend) -> Harness {
    harness_with(backend, |_| {})
}

/// Like [`harness`], with the configuration adjusted by `configure`.
pub fn harness_with(backend: FakeBackend, configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&dir);
    configure(&mut config);
    let state = AppState::new(&config, Arc::new(backend.clone()));
    Harness {
        dir,
        config,
        state,
        backend,
    }
}

/// Application state whose jobs wait in `HeldDispatcher` until run by hand.
pub fn held_harness() -> (Harness, Arc<HeldDispatcher>, Arc<Worker>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&dir);
    let backend = FakeBackend::new();
    let models = Arc::new(ModelCache::new(Arc::new(backend.clone())));
    let estimator = ProgressEstimator::new(config.separation_seconds_per_audio_second);
    let worker = Arc::new(Worker::new(Arc::clone(&models), estimator));
    let held = Arc::new(HeldDispatcher::default());
    let state = AppState::with_dispatcher(&config, models, estimator, held.clone());
    (
        Harness {
            dir,
            config,
            state,
            backend,
        },
        held,
        worker,
    )
}

/// A mono 16-bit sine tone encoded as WAV.
pub fn wav_bytes(seconds: u32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).expect("wav writer");
        let frames = seconds * sample_rate;
        for n in 0..frames {
            let t = n as f32 / sample_rate as f32;
            let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.4;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    bytes
}

/// Poll until the job is terminal, returning the final status and every
/// overall progress value observed on the way.
pub fn wait_for_terminal(state: &AppState, job_id: Uuid) -> (JobStatusResponse, Vec<u8>) {
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut observed = Vec::new();
    loop {
        let status = state.status.get_status(job_id).expect("job exists");
        observed.push(status.progress);
        if status.status.is_terminal() {
            return (status, observed);
        }
        assert!(
            Instant::now() < deadline,
            "job {job_id} stuck in {}",
            status.status
        );
        thread::sleep(Duration::from_millis(5));
    }
}
