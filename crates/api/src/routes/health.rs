use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use ingestion_events::Health;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
}

/// Status banner payload.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub message: &'static str,
}

/// GET /health -- 200 while the producer is running, 503 otherwise.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.lifecycle.health_check();

    let code = match health {
        Health::Healthy => StatusCode::OK,
        Health::Unhealthy(reason) => {
            tracing::warn!(reason, "Health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    (
        code,
        Json(HealthResponse {
            status: health.as_str(),
            timestamp: Utc::now(),
            service: state.service.service_name.clone(),
            version: state.service.service_version.clone(),
        }),
    )
}

/// GET /api/v1/status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        service: state.service.service_name.clone(),
        version: state.service.service_version.clone(),
        timestamp: Utc::now(),
        message: "Service is ready to receive events",
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Mount the status banner (under `/api/v1`).
pub fn status_router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}
