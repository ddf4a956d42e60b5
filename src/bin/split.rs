//! Split a single audio file into stems from the command line.
//!
//! Runs the same pipeline as the server, synchronously on the current thread.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stem_splitter::config::AppConfig;
use stem_splitter::models::job::JobState;
use stem_splitter::services::{
    model_cache::ModelCache,
    progress::ProgressEstimator,
    registry::JobRegistry,
    separator::DemucsCli,
    submission::{Submission, SubmissionGateway},
    worker::{InlineDispatcher, Worker},
};

#[derive(Parser, Debug)]
#[command(name = "split", about = "Split audio into stems using Demucs")]
struct Args {
    /// Path to the input audio file
    input_path: PathBuf,

    /// Directory to save the output stems
    output_dir: PathBuf,

    /// Demucs model name ('htdemucs' for 4 stems, 'htdemucs_6s' for 6 stems)
    #[arg(long, default_value = "htdemucs")]
    model: String,

    /// Torch device passed to Demucs
    #[arg(long)]
    device: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::with_output_root(&args.output_dir);
    if let Ok(python) = std::env::var("DEMUCS_PYTHON") {
        config.demucs_python = python;
    }

    let bytes = match std::fs::read(&args.input_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", args.input_path.display());
            return ExitCode::FAILURE;
        }
    };
    let filename = args
        .input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let backend = Arc::new(DemucsCli::new(config.demucs_python.clone(), args.device));
    let estimator = ProgressEstimator::new(config.separation_seconds_per_audio_second);
    let worker = Arc::new(Worker::new(Arc::new(ModelCache::new(backend)), estimator));
    let registry = Arc::new(JobRegistry::new());
    let gateway = SubmissionGateway::new(
        Arc::clone(&registry),
        Arc::new(InlineDispatcher::new(worker)),
        config.upload_dir(),
        config.output_root.clone(),
        config.max_upload_bytes,
    );

    let job_id = match gateway.submit(Submission {
        bytes,
        filename,
        model: Some(args.model),
        output_directory: None,
    }) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let job = match registry.get(job_id) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match job.state {
        JobState::Completed => {
            for stem in &job.stems {
                println!(
                    "Saved {} to {}",
                    stem.name,
                    job.output_directory.join(&stem.relative_path).display()
                );
            }
            ExitCode::SUCCESS
        }
        JobState::Error => {
            eprintln!("{}", job.error.unwrap_or_default());
            ExitCode::FAILURE
        }
        JobState::Queued
        | JobState::LoadingModel
        | JobState::LoadingAudio
        | JobState::SeparatingStems
        | JobState::SavingStems => {
            eprintln!("Job {job_id} stopped in state {}", job.state);
            ExitCode::FAILURE
        }
    }
}
