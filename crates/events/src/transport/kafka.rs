//! librdkafka-backed transport.
//!
//! Uses a [`ThreadedProducer`]: librdkafka's poll thread invokes
//! [`ReportingContext::delivery`] for every message, which forwards the
//! outcome to the producer's listener streams.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingestion_core::config::{Acks, ProducerSettings};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::client::ClientContext;

use super::{
    BrokerConnector, BrokerTransport, DeliveryAck, DeliveryFailure, DeliveryReporter,
    OutboundMessage, TransportError,
};
use crate::error::ConnectionError;

/// Pause between enqueue attempts while librdkafka's local queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Connects to a Kafka cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Build the librdkafka client configuration for `settings`.
pub fn client_config(settings: &ProducerSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", settings.brokers.join(","))
        .set("acks", settings.acks.as_str())
        .set("message.send.max.retries", settings.retries.to_string())
        .set("retry.backoff.ms", "100")
        .set("batch.size", settings.batch_size.to_string())
        .set("linger.ms", settings.linger.as_millis().to_string())
        .set("compression.type", settings.compression.as_str())
        .set("message.max.bytes", settings.max_message_bytes.to_string());

    // Idempotence requires acks=all and at least one retry.
    if settings.acks == Acks::All && settings.retries >= 1 {
        config.set("enable.idempotence", "true");
    }
    config
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(
        &self,
        settings: &ProducerSettings,
        reporter: DeliveryReporter,
    ) -> Result<Box<dyn BrokerTransport>, ConnectionError> {
        let producer: ThreadedProducer<ReportingContext> = client_config(settings)
            .create_with_context(ReportingContext { reporter })
            .map_err(|e| ConnectionError::Client(e.to_string()))?;
        let producer = Arc::new(producer);

        let probe = Arc::clone(&producer);
        let topic = settings.topic.clone();
        let timeout = settings.connect_timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| ConnectionError::Client(format!("metadata probe failed: {e}")))?;

        let broker_count = metadata.map_err(|e| ConnectionError::Unreachable {
            brokers: settings.brokers.join(","),
            reason: e.to_string(),
        })?;

        tracing::debug!(broker_count, topic = %settings.topic, "Kafka cluster reachable");

        Ok(Box::new(KafkaTransport { producer }))
    }
}

// ---------------------------------------------------------------------------
// Delivery context
// ---------------------------------------------------------------------------

struct ReportingContext {
    reporter: DeliveryReporter,
}

impl ClientContext for ReportingContext {}

impl ProducerContext for ReportingContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        match result {
            Ok(message) => self.reporter.acknowledged(DeliveryAck {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            }),
            Err((error, message)) => self.reporter.failed(DeliveryFailure {
                topic: message.topic().to_string(),
                key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                reason: error.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// KafkaTransport
// ---------------------------------------------------------------------------

struct KafkaTransport {
    producer: Arc<ThreadedProducer<ReportingContext>>,
}

#[async_trait]
impl BrokerTransport for KafkaTransport {
    async fn enqueue(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let timestamp = message.timestamp.timestamp_millis();

        loop {
            let record = BaseRecord::to(&message.topic)
                .key(message.key.as_str())
                .payload(message.payload.as_slice())
                .timestamp(timestamp);

            match self.producer.send(record) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {}
                Err((e, _)) => return Err(TransportError::Broker(e.to_string())),
            }
            tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
        }
    }

    async fn close(&self, timeout: Duration) -> Result<(), TransportError> {
        let producer = Arc::clone(&self.producer);
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| TransportError::Broker(format!("flush task failed: {e}")))?
            .map_err(|e| TransportError::Broker(e.to_string()))
    }
}
