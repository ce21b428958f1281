//! Handler for event tracking.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use ingestion_core::event::RawEvent;
use ingestion_core::validation::validate_raw_event;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::handlers::{request_id, ReceivedAt};
use crate::state::AppState;

/// Body of a successful `POST /api/v1/events/track`.
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub event_id: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/v1/events/track
///
/// Parse, validate, enrich and publish one event. Responds once the event is
/// in the producer's send queue.
///
/// Bodies must be `application/json` and at most [`MAX_BODY_BYTES`](crate::router::MAX_BODY_BYTES).
pub async fn track_event(
    ReceivedAt(received_at): ReceivedAt,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RawEvent>, JsonRejection>,
) -> AppResult<Json<TrackResponse>> {
    let request_id = request_id(&headers);
    tracing::debug!(request_id = %request_id, "Processing event tracking request");

    let Json(raw) = payload.map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e.body_text(), "Rejected event payload");
        AppError::from(e).with_request_id(&request_id)
    })?;

    validate_raw_event(&raw).map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Event validation failed");
        AppError::from(e).with_request_id(&request_id)
    })?;

    let cancel = state.shutdown.child_token();
    let receipt = state
        .publisher
        .track(raw, &request_id, received_at, &cancel)
        .await
        .map_err(|e| AppError::from(e).with_request_id(&request_id))?;

    Ok(Json(TrackResponse {
        status: "success",
        message: "Event received and processed successfully",
        event_id: receipt.event_id,
        request_id: receipt.request_id,
        timestamp: receipt.processed_at,
    }))
}
