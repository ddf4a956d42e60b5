use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::audio::AudioBuffer;
use crate::models::separation::{ModelVariant, StemName};
use crate::services::codec::{self, CodecError};

/// A loaded separation model.
///
/// `separate` is a single blocking call with no progress reporting; callers
/// only learn that it started and that it returned.
pub trait SeparationModel: Send + Sync {
    fn variant(&self) -> ModelVariant;

    fn separate(&self, audio: &AudioBuffer) -> Result<HashMap<StemName, AudioBuffer>, BackendError>;
}

/// Source of separation models. Loading may be expensive (weight download,
/// device initialisation) and is cached by [`ModelCache`](super::model_cache::ModelCache).
pub trait SeparationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, variant: ModelVariant) -> Result<Arc<dyn SeparationModel>, BackendError>;
}

const WORKER_SCRIPT: &str = include_str!("demucs_worker.py");

/// Runs Demucs in long-lived Python worker processes.
///
/// Loading a variant starts a worker that initialises the model once and then
/// serves every separation for that variant over stdin/stdout.
pub struct DemucsCli {
    python: String,
    device: Option<String>,
}

impl DemucsCli {
    pub fn new(python: impl Into<String>, device: Option<String>) -> Self {
        Self {
            python: python.into(),
            device,
        }
    }
}

impl SeparationBackend for DemucsCli {
    fn name(&self) -> &'static str {
        "demucs-cli"
    }

    fn load(&self, variant: ModelVariant) -> Result<Arc<dyn SeparationModel>, BackendError> {
        tracing::info!(model = %variant, python = %self.python, "Starting Demucs worker");
        let worker = PythonWorker::spawn(&self.python, variant, self.device.as_deref())?;

        Ok(Arc::new(DemucsCliModel {
            python: self.python.clone(),
            device: self.device.clone(),
            variant,
            worker: Mutex::new(Some(worker)),
        }))
    }
}

struct DemucsCliModel {
    python: String,
    device: Option<String>,
    variant: ModelVariant,
    /// `None` after the worker died; the next separation starts a new one.
    worker: Mutex<Option<PythonWorker>>,
}

impl SeparationModel for DemucsCliModel {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<HashMap<StemName, AudioBuffer>, BackendError> {
        let workdir = tempfile::Builder::new().prefix("demucs-").tempdir()?;
        let input = workdir.path().join("mix.wav");
        codec::write_wav(&input, audio)?;
        let out_dir = workdir.path().join("separated");

        tracing::debug!(model = %self.variant, frames = audio.frames(), "Running Demucs");
        {
            let mut slot = self.worker.lock();
            let mut worker = match slot.take() {
                Some(worker) => worker,
                None => {
                    tracing::warn!(model = %self.variant, "Restarting Demucs worker");
                    PythonWorker::spawn(&self.python, self.variant, self.device.as_deref())?
                }
            };

            let result = worker.separate(&input, &out_dir);
            if !matches!(&result, Err(e) if e.kills_worker()) {
                *slot = Some(worker);
            }
            result?;
        }

        read_stems(&out_dir, self.variant)
    }
}

/// Message written by the worker, one JSON object per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerMessage {
    Ready,
    Done,
    Error { message: String },
}

#[derive(Serialize)]
struct SeparateRequest<'a> {
    input: &'a Path,
    output: &'a Path,
}

/// A Python process holding one initialised model.
struct PythonWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl PythonWorker {
    /// Start the worker and wait until its model is loaded.
    fn spawn(python: &str, variant: ModelVariant, device: Option<&str>) -> Result<Self, BackendError> {
        let mut cmd = Command::new(python);
        cmd.arg("-u").arg("-c").arg(WORKER_SCRIPT).arg(variant.name());
        if let Some(device) = device {
            cmd.arg(device);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(BackendError::Spawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::Protocol("worker pipes not captured".to_string()));
        };

        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        match worker.receive()? {
            WorkerMessage::Ready => Ok(worker),
            WorkerMessage::Error { message } => Err(BackendError::Model(message)),
            WorkerMessage::Done => Err(BackendError::Protocol(
                "worker answered before loading its model".to_string(),
            )),
        }
    }

    fn separate(&mut self, input: &Path, output: &Path) -> Result<(), BackendError> {
        let request = serde_json::to_string(&SeparateRequest { input, output })
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        writeln!(self.stdin, "{request}")?;
        self.stdin.flush()?;

        match self.receive()? {
            WorkerMessage::Done => Ok(()),
            WorkerMessage::Error { message } => Err(BackendError::Model(message)),
            WorkerMessage::Ready => Err(BackendError::Protocol(
                "unexpected ready message".to_string(),
            )),
        }
    }

    /// Next protocol message; other output lines are logged and skipped.
    fn receive(&mut self) -> Result<WorkerMessage, BackendError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                let status = self.child.wait()?;
                return Err(BackendError::Exited(status.code()));
            }
            match serde_json::from_str::<WorkerMessage>(line.trim()) {
                Ok(message) => return Ok(message),
                Err(_) => tracing::debug!(line = line.trim(), "Demucs worker output"),
            }
        }
    }
}

impl Drop for PythonWorker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_stems(
    track_dir: &Path,
    variant: ModelVariant,
) -> Result<HashMap<StemName, AudioBuffer>, BackendError> {
    let mut stems = HashMap::with_capacity(variant.stems().len());
    for &stem in variant.stems() {
        let path = track_dir.join(format!("{stem}.wav"));
        if !path.is_file() {
            return Err(BackendError::MissingOutput(path));
        }
        stems.insert(stem, codec::read_wav(&path)?);
    }
    Ok(stems)
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to start separation process: {0}")]
    Spawn(#[source] io::Error),

    #[error("Separation process exited with status {0:?}")]
    Exited(Option<i32>),

    #[error("Separation process protocol error: {0}")]
    Protocol(String),

    #[error("Separation produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Model returned no '{0}' stem")]
    MissingStem(StemName),

    #[error("{0}")]
    Model(String),

    #[error("Audio exchange failed: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Whether the worker process can no longer serve requests.
    fn kills_worker(&self) -> bool {
        matches!(
            self,
            BackendError::Exited(_) | BackendError::Protocol(_) | BackendError::Io(_)
        )
    }
}
