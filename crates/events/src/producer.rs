//! Broker producer handle.
//!
//! [`ProducerHandle::connect`] validates the configuration, opens a
//! [`BrokerTransport`] and spawns two listener tasks: one drains the
//! acknowledgment stream, the other the error stream. Both only log and
//! count; delivery failures are never retried from here.
//!
//! The handle moves `Open -> Closing -> Closed`. [`ProducerHandle::close`]
//! refuses new sends first, flushes the transport, then stops and joins the
//! listeners so late acknowledgments from the flush are still observed.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ingestion_core::config::{ProducerConfig, ProducerSettings};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionError, SendError, ShutdownError};
use crate::transport::{
    BrokerConnector, BrokerTransport, DeliveryAck, DeliveryFailure, DeliveryReporter,
    DeliveryReports, OutboundMessage,
};

/// Upper bound on flushing queued messages during [`ProducerHandle::close`].
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle state of a [`ProducerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    Open,
    Closing,
    Closed,
}

impl ProducerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            OPEN => ProducerState::Open,
            CLOSING => ProducerState::Closing,
            _ => ProducerState::Closed,
        }
    }
}

/// Result of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// Carries a short reason for logs.
    Unhealthy(&'static str),
}

impl Health {
    pub fn is_healthy(self) -> bool {
        matches!(self, Health::Healthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Unhealthy(_) => "unhealthy",
        }
    }
}

/// A message was accepted into the send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    /// Serialized payload size in bytes.
    pub size: usize,
}

/// Outcome of [`ProducerHandle::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// Another call already closed (or is closing) the handle.
    AlreadyClosed,
}

// ---------------------------------------------------------------------------
// Delivery counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DeliveryCounters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// ProducerHandle
// ---------------------------------------------------------------------------

/// An open producer connection.
pub struct ProducerHandle {
    settings: ProducerSettings,
    transport: Box<dyn BrokerTransport>,
    state: AtomicU8,
    /// Cancelled when closing starts; unblocks sends waiting on the queue.
    closing: CancellationToken,
    /// Cancelled after the flush; stops the listeners.
    listeners_cancel: CancellationToken,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<DeliveryCounters>,
}

impl ProducerHandle {
    /// Validate `config`, connect through `connector` and start the
    /// delivery listeners.
    pub async fn connect(
        config: &ProducerConfig,
        connector: &dyn BrokerConnector,
    ) -> Result<Self, ConnectionError> {
        let settings = ProducerSettings::try_from(config)?;

        let (reporter, reports) = DeliveryReporter::channel();
        let transport = connector.connect(&settings, reporter).await?;

        let counters = Arc::new(DeliveryCounters::default());
        let listeners_cancel = CancellationToken::new();
        let listeners = spawn_listeners(reports, &counters, &listeners_cancel);

        tracing::info!(
            brokers = %settings.brokers.join(","),
            topic = %settings.topic,
            acks = %settings.acks,
            compression = %settings.compression,
            "Kafka producer initialized",
        );

        Ok(Self {
            settings,
            transport,
            state: AtomicU8::new(OPEN),
            closing: CancellationToken::new(),
            listeners_cancel,
            listeners: Mutex::new(listeners),
            counters,
        })
    }

    /// Serialize `payload` as JSON and hand it to the send queue under `key`.
    ///
    /// Returns once the message is queued; the broker's verdict arrives later
    /// on the listener streams. Blocks for at most the configured enqueue
    /// timeout on a full queue, and returns early if `cancel` fires or the
    /// handle starts closing.
    pub async fn send<T>(
        &self,
        key: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<Accepted, SendError>
    where
        T: Serialize + Sync + ?Sized,
    {
        if self.state() != ProducerState::Open {
            return Err(SendError::Closing);
        }

        let bytes =
            serde_json::to_vec(payload).map_err(|e| SendError::Serialization(e.to_string()))?;
        let size = bytes.len();
        if size > self.settings.max_message_bytes {
            return Err(SendError::MessageTooLarge {
                size,
                max: self.settings.max_message_bytes,
            });
        }

        let message = OutboundMessage {
            topic: self.settings.topic.clone(),
            key: key.to_string(),
            payload: bytes,
            timestamp: Utc::now(),
        };

        let outcome = tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(SendError::Closing),
            _ = cancel.cancelled() => Err(SendError::Cancelled),
            enqueued = tokio::time::timeout(
                self.settings.enqueue_timeout,
                self.transport.enqueue(message),
            ) => match enqueued {
                Ok(result) => result.map_err(SendError::from),
                Err(_) => Err(SendError::QueueFull),
            },
        };
        outcome?;

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(topic = %self.settings.topic, key, size, "Message sent to Kafka");

        Ok(Accepted { size })
    }

    pub fn health_check(&self) -> Health {
        match self.state() {
            ProducerState::Open => Health::Healthy,
            ProducerState::Closing => Health::Unhealthy("producer is closing"),
            ProducerState::Closed => Health::Unhealthy("producer is closed"),
        }
    }

    /// Stop accepting sends, flush the transport and stop the listeners.
    ///
    /// Only the first call does any work; later (or concurrent) calls return
    /// [`CloseOutcome::AlreadyClosed`].
    pub async fn close(&self) -> Result<CloseOutcome, ShutdownError> {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(topic = %self.settings.topic, "Kafka producer already closed");
            return Ok(CloseOutcome::AlreadyClosed);
        }

        tracing::info!(topic = %self.settings.topic, "Closing Kafka producer");
        self.closing.cancel();

        let flushed = self.transport.close(FLUSH_TIMEOUT).await;

        self.listeners_cancel.cancel();
        let listeners = std::mem::take(&mut *self.listeners.lock().await);
        for listener in listeners {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "Delivery listener ended abnormally");
            }
        }

        self.state.store(CLOSED, Ordering::Release);

        let deliveries = self.deliveries();
        match flushed {
            Ok(()) => {
                tracing::info!(
                    enqueued = deliveries.enqueued,
                    delivered = deliveries.delivered,
                    failed = deliveries.failed,
                    "Kafka producer closed",
                );
                Ok(CloseOutcome::Closed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to close Kafka producer");
                Err(ShutdownError::Close(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> ProducerState {
        ProducerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }

    pub fn deliveries(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("topic", &self.settings.topic)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.closing.cancel();
        self.listeners_cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

fn spawn_listeners(
    reports: DeliveryReports,
    counters: &Arc<DeliveryCounters>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let DeliveryReports { acks, failures } = reports;

    let ack_counters = Arc::clone(counters);
    let ack_listener = spawn_listener(acks, cancel.clone(), move |ack: DeliveryAck| {
        ack_counters.delivered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            topic = %ack.topic,
            partition = ack.partition,
            offset = ack.offset,
            key = ack.key.as_deref().unwrap_or_default(),
            "Message delivered",
        );
    });

    let failure_counters = Arc::clone(counters);
    let failure_listener =
        spawn_listener(failures, cancel.clone(), move |failure: DeliveryFailure| {
            failure_counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                topic = %failure.topic,
                key = failure.key.as_deref().unwrap_or_default(),
                error = %failure.reason,
                "Failed to deliver message",
            );
        });

    vec![ack_listener, failure_listener]
}

/// Run `handle` for every report until the stream ends or `cancel` fires,
/// then drain whatever is already buffered.
fn spawn_listener<T, F>(
    mut reports: mpsc::UnboundedReceiver<T>,
    cancel: CancellationToken,
    mut handle: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                report = reports.recv() => match report {
                    Some(report) => handle(report),
                    None => return,
                },
            }
        }

        while let Ok(report) = reports.try_recv() {
            handle(report);
        }
    })
}
