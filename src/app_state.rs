use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    model_cache::ModelCache,
    progress::ProgressEstimator,
    registry::JobRegistry,
    separator::SeparationBackend,
    status::StatusGateway,
    storage::ArtifactStore,
    submission::SubmissionGateway,
    worker::{Dispatcher, ThreadDispatcher, Worker},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub models: Arc<ModelCache>,
    pub store: Arc<ArtifactStore>,
    pub submissions: Arc<SubmissionGateway>,
    pub status: Arc<StatusGateway>,
}

impl AppState {
    /// Wire the collaborators, running each job on its own thread.
    pub fn new(config: &AppConfig, backend: Arc<dyn SeparationBackend>) -> Self {
        let models = Arc::new(ModelCache::new(backend));
        let estimator = ProgressEstimator::new(config.separation_seconds_per_audio_second);
        let worker = Arc::new(Worker::new(Arc::clone(&models), estimator));
        let dispatcher = Arc::new(ThreadDispatcher::new(worker));
        Self::with_dispatcher(config, models, estimator, dispatcher)
    }

    pub fn with_dispatcher(
        config: &AppConfig,
        models: Arc<ModelCache>,
        estimator: ProgressEstimator,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let store = ArtifactStore::new(&config.output_root);

        let submissions = SubmissionGateway::new(
            Arc::clone(&registry),
            dispatcher,
            config.upload_dir(),
            config.output_root.clone(),
            config.max_upload_bytes,
        );
        let status = StatusGateway::new(Arc::clone(&registry), estimator, store.clone());

        Self {
            registry,
            models,
            store: Arc::new(store),
            submissions: Arc::new(submissions),
            status: Arc::new(status),
        }
    }
}
