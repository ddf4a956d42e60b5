use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::separation::ModelVariant;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    pub jobs: usize,
}

#[derive(Serialize, Deserialize)]
pub struct HealthChecks {
    pub output_root: ComponentHealth,
    pub models: ModelsHealth,
}

#[derive(Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct ModelsHealth {
    pub backend: String,
    pub loaded: Vec<ModelVariant>,
}

/// GET /health — output storage and model cache status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    // Check the output root accepts writes
    let store = state.store.clone();
    let writable = tokio::task::spawn_blocking(move || store.check_writable())
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    let output_check = if writable {
        ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        }
    } else {
        tracing::warn!(root = %state.store.root().display(), "Output root is not writable");
        ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        }
    };

    let status_code = if writable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if writable {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            output_root: output_check,
            models: ModelsHealth {
                backend: state.models.backend_name().to_string(),
                loaded: state.models.loaded(),
            },
        },
        jobs: state.registry.len(),
    };

    (status_code, Json(response))
}
