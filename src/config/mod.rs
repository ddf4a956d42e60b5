use std::path::PathBuf;

use serde::Deserialize;

use crate::services::submission::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root directory for stems of jobs without a custom output directory
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Where uploads are staged while their job runs. Defaults to the system temp dir.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Python interpreter with the `demucs` package installed
    #[serde(default = "default_demucs_python")]
    pub demucs_python: String,

    /// Torch device passed to Demucs ("cuda", "cpu"); Demucs picks one when unset
    #[serde(default)]
    pub demucs_device: Option<String>,

    /// Expected separation time per second of audio, pacing the progress ramp
    #[serde(default = "default_seconds_per_audio_second")]
    pub separation_seconds_per_audio_second: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_output_root() -> PathBuf {
    PathBuf::from("static/outputs")
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_demucs_python() -> String {
    "python3".to_string()
}

fn default_seconds_per_audio_second() -> f64 {
    0.5
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Defaults with all output under `root`; used by the CLI and tests.
    pub fn with_output_root(root: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: default_bind_addr(),
            output_root: root.into(),
            upload_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
            demucs_python: default_demucs_python(),
            demucs_device: None,
            separation_seconds_per_audio_second: default_seconds_per_audio_second(),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
