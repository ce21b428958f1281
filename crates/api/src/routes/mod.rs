pub mod events;
pub mod health;
pub mod stats;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// POST /events/track     track one event
/// GET  /stats            producer statistics
/// GET  /status           liveness banner
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .merge(stats::router())
        .merge(health::status_router())
}
