//! Event publishing pipeline.
//!
//! This crate owns everything between an enriched event and the broker:
//!
//! - [`ProducerHandle`]: the broker connection. Sends are accepted into the
//!   client's queue and acknowledged asynchronously; two listener tasks drain
//!   the acknowledgment and error streams for the handle's lifetime.
//! - [`EventPublisher`]: bounded retry with quadratic backoff on top of an
//!   [`EventSink`], plus the enrich → publish → stamp flow used by callers.
//! - [`Lifecycle`]: startup, health, stats and deadline-bounded shutdown.
//! - [`transport`]: the broker client seam, with an in-memory broker and
//!   (behind the `kafka` feature) an rdkafka-backed client.

pub mod error;
pub mod lifecycle;
pub mod producer;
pub mod publisher;
pub mod transport;

pub use error::{ConnectionError, PublishError, SendError, ShutdownError};
pub use lifecycle::{Lifecycle, LifecycleState, ProducerStats, ProducerStatus, StartError};
pub use producer::{Accepted, CloseOutcome, DeliverySnapshot, Health, ProducerHandle, ProducerState};
pub use publisher::{EventPublisher, EventSink, PublishAck, PublishReceipt};
pub use transport::memory::{MemoryBroker, MemoryConnector};
#[cfg(feature = "kafka")]
pub use transport::kafka::KafkaConnector;
