use axum::routing::post;
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Mount event routes (nested under `/api/v1/events`).
pub fn router() -> Router<AppState> {
    Router::new().route("/track", post(events::track_event))
}
