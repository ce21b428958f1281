//! Broker client selection for `KAFKA_TRANSPORT`.

use ingestion_core::config::TransportKind;
use ingestion_events::transport::BrokerConnector;
use ingestion_events::{MemoryBroker, MemoryConnector};

/// The requested transport was compiled out of this binary.
#[derive(Debug, thiserror::Error)]
#[error(
    "KAFKA_TRANSPORT=kafka but this binary was built without the `kafka` feature; \
     rebuild with default features or set KAFKA_TRANSPORT=memory"
)]
pub struct KafkaUnavailable;

/// Pick the broker client for `kind`.
pub fn connector(kind: TransportKind) -> Result<Box<dyn BrokerConnector>, KafkaUnavailable> {
    match kind {
        TransportKind::Memory => {
            tracing::warn!("Using the in-memory broker; events will not leave this process");
            Ok(Box::new(MemoryConnector::new(MemoryBroker::new())))
        }
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => Ok(Box::new(ingestion_events::KafkaConnector::new())),
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => Err(KafkaUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use ingestion_core::config::ProducerConfig;

    use super::*;

    #[test]
    fn memory_transport_is_always_available() {
        assert!(connector(TransportKind::Memory).is_ok());
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn default_transport_is_available_in_default_build() {
        assert!(connector(ProducerConfig::default().transport).is_ok());
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn kafka_without_feature_explains_how_to_recover() {
        let err = connector(ProducerConfig::default().transport).err();
        let message = err.map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("KAFKA_TRANSPORT=memory"), "{message}");
    }
}
