use axum::extract::State;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use ingestion_events::ProducerStats;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub service: String,
    pub version: String,
    pub kafka: ProducerStats,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/v1/stats
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        service: state.service.service_name.clone(),
        version: state.service.service_version.clone(),
        kafka: state.lifecycle.stats(),
        timestamp: Utc::now(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}
