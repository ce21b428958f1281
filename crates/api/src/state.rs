use std::sync::Arc;

use ingestion_core::event::ServiceInfo;
use ingestion_events::{EventPublisher, Lifecycle};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Owns the producer; backs health and stats.
    pub lifecycle: Arc<Lifecycle>,
    /// Enrich-and-publish entry point for tracked events.
    pub publisher: EventPublisher,
    pub service: Arc<ServiceInfo>,
    /// Cancelled when the server begins shutting down; aborts publish retries.
    pub shutdown: CancellationToken,
}
