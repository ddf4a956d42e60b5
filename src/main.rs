use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stem_splitter::app_state::AppState;
use stem_splitter::config::AppConfig;
use stem_splitter::routes;
use stem_splitter::services::separator::DemucsCli;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing stem-splitter server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    tracing::info!(root = %config.output_root.display(), "Preparing output root");
    std::fs::create_dir_all(&config.output_root).expect("Failed to create output root");

    tracing::info!(
        python = %config.demucs_python,
        device = config.demucs_device.as_deref().unwrap_or("auto"),
        "Using Demucs worker backend"
    );
    let backend = Arc::new(DemucsCli::new(
        config.demucs_python.clone(),
        config.demucs_device.clone(),
    ));

    // Create shared application state
    let state = AppState::new(&config, backend);

    let app = Router::new()
        .merge(routes::router(state))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting stem-splitter on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
