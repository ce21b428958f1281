//! In-process broker.
//!
//! [`MemoryBroker`] stands in for a Kafka cluster: a bounded send queue is
//! drained by a delivery task that appends each message to an in-memory log
//! (partition 0, increasing offsets) and reports it on the acknowledgment
//! stream. Deliveries can be paused, which lets the queue fill up, or
//! rejected, which routes them to the error stream instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ingestion_core::config::ProducerSettings;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use super::{
    BrokerConnector, BrokerTransport, DeliveryAck, DeliveryFailure, DeliveryReporter,
    OutboundMessage, TransportError,
};
use crate::error::ConnectionError;

/// Send queue capacity used by [`MemoryBroker::new`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// Shared view of the in-process broker. Cheap to clone.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    log: Mutex<Vec<OutboundMessage>>,
    reject: AtomicBool,
    paused: watch::Sender<bool>,
    queue_capacity: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a broker whose send queue holds at most `capacity` messages.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(BrokerInner {
                log: Mutex::new(Vec::new()),
                reject: AtomicBool::new(false),
                paused,
                queue_capacity: capacity.max(1),
            }),
        }
    }

    /// Messages delivered so far, in delivery order.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.inner
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Route subsequent deliveries to the error stream instead of the log.
    pub fn reject_deliveries(&self, reject: bool) {
        self.inner.reject.store(reject, Ordering::Release);
    }

    /// Stop draining the send queue.
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    fn record(&self, message: OutboundMessage) -> i64 {
        let mut log = self.inner.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.push(message);
        log.len() as i64 - 1
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// Connects producers to a [`MemoryBroker`].
pub struct MemoryConnector {
    broker: MemoryBroker,
    reachable: bool,
}

impl MemoryConnector {
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            reachable: true,
        }
    }

    /// A connector whose every connect attempt fails as if no broker answered.
    pub fn unreachable() -> Self {
        Self {
            broker: MemoryBroker::new(),
            reachable: false,
        }
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(
        &self,
        settings: &ProducerSettings,
        reporter: DeliveryReporter,
    ) -> Result<Box<dyn BrokerTransport>, ConnectionError> {
        if !self.reachable {
            return Err(ConnectionError::Unreachable {
                brokers: settings.brokers.join(","),
                reason: "no broker answered".to_string(),
            });
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.broker.inner.queue_capacity);
        let delivery = tokio::spawn(run_delivery(self.broker.clone(), queue_rx, reporter));

        tracing::debug!(topic = %settings.topic, "Connected to in-memory broker");

        Ok(Box::new(MemoryTransport {
            queue: RwLock::new(Some(queue_tx)),
            delivery: tokio::sync::Mutex::new(Some(delivery)),
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

struct MemoryTransport {
    /// `None` once closed.
    queue: RwLock<Option<mpsc::Sender<OutboundMessage>>>,
    delivery: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BrokerTransport for MemoryTransport {
    async fn enqueue(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let queue = self
            .queue
            .read()
            .await
            .clone()
            .ok_or(TransportError::Closed)?;

        queue.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&self, timeout: Duration) -> Result<(), TransportError> {
        // Dropping the sender lets the delivery task drain the queue and exit.
        self.queue.write().await.take();

        let Some(delivery) = self.delivery.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Broker(format!("delivery task failed: {e}"))),
            Err(_) => Err(TransportError::Broker(format!(
                "flush did not complete within {timeout:?}"
            ))),
        }
    }
}

/// Drain the send queue until every sender is gone.
async fn run_delivery(
    broker: MemoryBroker,
    mut queue: mpsc::Receiver<OutboundMessage>,
    reporter: DeliveryReporter,
) {
    let mut paused = broker.inner.paused.subscribe();

    loop {
        let ready = paused.wait_for(|p| !*p).await.is_ok();
        if !ready {
            break;
        }

        let Some(message) = queue.recv().await else {
            break;
        };

        if broker.inner.reject.load(Ordering::Acquire) {
            reporter.failed(DeliveryFailure {
                topic: message.topic.clone(),
                key: Some(message.key.clone()),
                reason: "delivery rejected by broker".to_string(),
            });
            continue;
        }

        let ack = DeliveryAck {
            topic: message.topic.clone(),
            partition: 0,
            offset: 0,
            key: Some(message.key.clone()),
        };
        let offset = broker.record(message);
        reporter.acknowledged(DeliveryAck { offset, ..ack });
    }

    tracing::debug!("In-memory broker delivery task stopped");
}
