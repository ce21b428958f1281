//! Producer lifecycle: `Uninitialized -> Starting -> Running -> Draining -> Stopped`.
//!
//! [`Lifecycle`] owns the one producer handle of a service instance. A failed
//! start is fatal (the state goes straight to `Stopped`); there is no
//! degraded mode. Shutdown closes the handle on a separate task and gives up
//! waiting once the deadline passes, but always ends in `Stopped`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ingestion_core::config::ProducerConfig;
use serde::Serialize;

use crate::error::{ConnectionError, ShutdownError};
use crate::producer::{DeliverySnapshot, Health, ProducerHandle, ProducerState};
use crate::transport::BrokerConnector;

const UNINITIALIZED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const DRAINING: u8 = 3;
const STOPPED: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Starting,
    Running,
    Draining,
    Stopped,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            UNINITIALIZED => LifecycleState::Uninitialized,
            STARTING => LifecycleState::Starting,
            RUNNING => LifecycleState::Running,
            DRAINING => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Errors from [`Lifecycle::start`].
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// `start` was called in a state other than `Uninitialized`.
    #[error("cannot start producer in state {0:?}")]
    InvalidState(LifecycleState),
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerStatus {
    NotInitialized,
    Active,
    Closed,
}

/// Snapshot reported under `kafka` by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub status: ProducerStatus,
    #[serde(flatten)]
    pub details: Option<StatsDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsDetails {
    pub brokers: Vec<String>,
    pub topic: String,
    pub compression: &'static str,
    pub acks: &'static str,
    pub retries: u32,
    pub deliveries: DeliverySnapshot,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct Lifecycle {
    config: ProducerConfig,
    state: AtomicU8,
    producer: OnceLock<Arc<ProducerHandle>>,
}

impl Lifecycle {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(UNINITIALIZED),
            producer: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Connect the producer. Only valid once, from `Uninitialized`.
    pub async fn start(
        &self,
        connector: &dyn BrokerConnector,
    ) -> Result<Arc<ProducerHandle>, StartError> {
        if let Err(current) = self.state.compare_exchange(
            UNINITIALIZED,
            STARTING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(StartError::InvalidState(LifecycleState::from_u8(current)));
        }

        tracing::info!(topic = %self.config.topic, "Starting event producer");

        let handle = match ProducerHandle::connect(&self.config, connector).await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                self.state.store(STOPPED, Ordering::Release);
                tracing::error!(error = %e, "Failed to start event producer");
                return Err(e.into());
            }
        };

        if self.producer.set(Arc::clone(&handle)).is_err() {
            tracing::warn!("Producer handle was already set");
        }

        // Shutdown may have run while connecting.
        if self
            .state
            .compare_exchange(STARTING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if let Err(e) = handle.close().await {
                tracing::warn!(error = %e, "Failed to close producer started during shutdown");
            }
            return Err(StartError::InvalidState(LifecycleState::Stopped));
        }

        tracing::info!("Event producer running");
        Ok(handle)
    }

    /// The producer, while the lifecycle is `Running`.
    pub fn producer(&self) -> Option<Arc<ProducerHandle>> {
        if self.state() != LifecycleState::Running {
            return None;
        }
        self.producer.get().cloned()
    }

    /// Healthy only while running with an open handle.
    pub fn health_check(&self) -> Health {
        match self.state() {
            LifecycleState::Running => match self.producer.get() {
                Some(producer) => producer.health_check(),
                None => Health::Unhealthy("producer not initialized"),
            },
            LifecycleState::Uninitialized | LifecycleState::Starting => {
                Health::Unhealthy("producer not initialized")
            }
            LifecycleState::Draining | LifecycleState::Stopped => {
                Health::Unhealthy("producer is shut down")
            }
        }
    }

    /// Close the producer within `deadline`.
    ///
    /// Returns [`ShutdownError::DeadlineExceeded`] when the close did not
    /// finish in time; the close keeps running in the background. The state
    /// is `Stopped` afterwards either way.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        match self.state.compare_exchange(
            RUNNING,
            DRAINING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            // Another shutdown is already draining.
            Err(DRAINING) => return Ok(()),
            Err(current) => {
                self.state.store(STOPPED, Ordering::Release);
                tracing::debug!(
                    from = ?LifecycleState::from_u8(current),
                    "Event producer was not running; marked stopped",
                );
                return Ok(());
            }
        }

        let Some(producer) = self.producer.get().cloned() else {
            self.state.store(STOPPED, Ordering::Release);
            return Ok(());
        };

        tracing::info!(deadline_secs = deadline.as_secs(), "Draining event producer");

        let close = tokio::spawn(async move { producer.close().await });

        let result = match tokio::time::timeout(deadline, close).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(ShutdownError::Close(format!("close task failed: {e}"))),
            Err(_) => Err(ShutdownError::DeadlineExceeded(deadline)),
        };

        self.state.store(STOPPED, Ordering::Release);

        match &result {
            Ok(()) => tracing::info!("Event producer stopped"),
            Err(e) => tracing::error!(error = %e, "Event producer shutdown was forced"),
        }
        result
    }

    pub fn stats(&self) -> ProducerStats {
        let Some(producer) = self.producer.get() else {
            return ProducerStats {
                status: ProducerStatus::NotInitialized,
                details: None,
            };
        };

        let status = match producer.state() {
            ProducerState::Open => ProducerStatus::Active,
            ProducerState::Closing | ProducerState::Closed => ProducerStatus::Closed,
        };
        let settings = producer.settings();

        ProducerStats {
            status,
            details: Some(StatsDetails {
                brokers: settings.brokers.clone(),
                topic: settings.topic.clone(),
                compression: settings.compression.as_str(),
                acks: settings.acks.as_str(),
                retries: settings.retries,
                deliveries: producer.deliveries(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::transport::memory::{MemoryBroker, MemoryConnector};

    #[tokio::test]
    async fn stats_before_start_only_report_status() {
        let lifecycle = Lifecycle::new(ProducerConfig::default());
        assert_eq!(
            serde_json::to_value(lifecycle.stats()).unwrap(),
            json!({"status": "not_initialized"})
        );
    }

    #[tokio::test]
    async fn stats_while_running() {
        let lifecycle = Lifecycle::new(ProducerConfig::default());
        lifecycle
            .start(&MemoryConnector::new(MemoryBroker::new()))
            .await
            .unwrap();

        let stats = serde_json::to_value(lifecycle.stats()).unwrap();
        assert_eq!(stats["status"], "active");
        assert_eq!(stats["brokers"], json!(["localhost:9092"]));
        assert_eq!(stats["topic"], "user-activity-events");
        assert_eq!(stats["compression"], "snappy");
        assert_eq!(stats["acks"], "all");
        assert_eq!(stats["retries"], 3);
        assert_eq!(stats["deliveries"]["enqueued"], 0);
    }

    #[tokio::test]
    async fn failed_start_is_fatal() {
        let lifecycle = Lifecycle::new(ProducerConfig::default());
        let result = lifecycle.start(&MemoryConnector::unreachable()).await;

        assert_matches!(
            result,
            Err(StartError::Connection(ConnectionError::Unreachable { .. }))
        );
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.producer().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let lifecycle = Lifecycle::new(ProducerConfig::default());
        let connector = MemoryConnector::new(MemoryBroker::new());
        lifecycle.start(&connector).await.unwrap();

        assert_matches!(
            lifecycle.start(&connector).await,
            Err(StartError::InvalidState(LifecycleState::Running))
        );
    }

    #[tokio::test]
    async fn shutdown_without_start_lands_in_stopped() {
        let lifecycle = Lifecycle::new(ProducerConfig::default());
        lifecycle.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }
}
