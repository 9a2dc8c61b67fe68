//! Health check handlers

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;
use docshelf_common::library::LibraryStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub storage: CheckResult,
    pub artifacts: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<LibraryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: docshelf_common::VERSION.to_string(),
    })
}

/// Readiness probe - data and artifact directories are reachable
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let storage = match tokio::fs::metadata(&state.config.storage.data_dir).await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            counts: Some(state.library.stats().await),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            counts: None,
            error: Some(e.to_string()),
        },
    };

    let artifacts = match tokio::fs::read_dir(&state.config.storage.artifact_dir).await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            counts: None,
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            counts: None,
            error: Some(e.to_string()),
        },
    };

    let all_healthy = storage.status == "up" && artifacts.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks { storage, artifacts },
    })
}

/// Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
