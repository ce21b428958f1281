//! Broker client seam.
//!
//! A [`BrokerConnector`] opens a [`BrokerTransport`] for validated
//! [`ProducerSettings`]. Transports accept messages into their own send queue
//! and report the broker's verdict on each one through the
//! [`DeliveryReporter`] they were given at connect time. The producer drains
//! the matching [`DeliveryReports`] in its listener tasks.

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::time::Duration;

use async_trait::async_trait;
use ingestion_core::config::ProducerSettings;
use ingestion_core::types::Timestamp;
use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// A serialized message ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub timestamp: Timestamp,
}

/// Broker confirmation for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

/// Broker rejection for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub topic: String,
    pub key: Option<String>,
    pub reason: String,
}

/// Errors a transport can return from [`BrokerTransport::enqueue`] or
/// [`BrokerTransport::close`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("send queue is full")]
    QueueFull,

    #[error("transport is closed")]
    Closed,

    #[error("{0}")]
    Broker(String),
}

/// Asynchronous producer connection.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Accept a message into the send queue.
    ///
    /// Returns once the message is queued, not once the broker has
    /// acknowledged it. May wait while the queue is full.
    async fn enqueue(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Flush queued messages and release the connection.
    async fn close(&self, timeout: Duration) -> Result<(), TransportError>;
}

/// Factory for [`BrokerTransport`]s.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a connection. Delivery outcomes must be sent to `reporter`.
    async fn connect(
        &self,
        settings: &ProducerSettings,
        reporter: DeliveryReporter,
    ) -> Result<Box<dyn BrokerTransport>, ConnectionError>;
}

// ---------------------------------------------------------------------------
// Delivery channels
// ---------------------------------------------------------------------------

/// Sending half of the acknowledgment and error streams.
#[derive(Debug, Clone)]
pub struct DeliveryReporter {
    acks: mpsc::UnboundedSender<DeliveryAck>,
    failures: mpsc::UnboundedSender<DeliveryFailure>,
}

/// Receiving half of the acknowledgment and error streams.
#[derive(Debug)]
pub struct DeliveryReports {
    pub acks: mpsc::UnboundedReceiver<DeliveryAck>,
    pub failures: mpsc::UnboundedReceiver<DeliveryFailure>,
}

impl DeliveryReporter {
    /// Create a connected reporter / reports pair.
    pub fn channel() -> (Self, DeliveryReports) {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let (fail_tx, fail_rx) = mpsc::unbounded_channel();
        (
            Self {
                acks: ack_tx,
                failures: fail_tx,
            },
            DeliveryReports {
                acks: ack_rx,
                failures: fail_rx,
            },
        )
    }

    pub fn acknowledged(&self, ack: DeliveryAck) {
        // Listeners are gone once the producer has closed; late reports are dropped.
        let _ = self.acks.send(ack);
    }

    pub fn failed(&self, failure: DeliveryFailure) {
        let _ = self.failures.send(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reporter_feeds_both_streams() {
        let (reporter, mut reports) = DeliveryReporter::channel();

        reporter.acknowledged(DeliveryAck {
            topic: "t".into(),
            partition: 2,
            offset: 41,
            key: Some("k".into()),
        });
        reporter.failed(DeliveryFailure {
            topic: "t".into(),
            key: None,
            reason: "leader not available".into(),
        });

        let ack = reports.acks.recv().await.unwrap();
        assert_eq!((ack.partition, ack.offset), (2, 41));

        let failure = reports.failures.recv().await.unwrap();
        assert_eq!(failure.reason, "leader not available");
    }

    #[test]
    fn reporting_after_receivers_dropped_does_not_panic() {
        let (reporter, reports) = DeliveryReporter::channel();
        drop(reports);
        reporter.failed(DeliveryFailure {
            topic: "t".into(),
            key: None,
            reason: "late".into(),
        });
    }
}
