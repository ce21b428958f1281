//! Error taxonomy of the publishing pipeline.
//!
//! - [`ConnectionError`]: startup only; the service must not serve traffic.
//! - [`SendError`]: one enqueue attempt; split into transient and terminal.
//! - [`PublishError`]: outcome of a full publish after retries.
//! - [`ShutdownError`]: close failed or overran its deadline.

use std::time::Duration;

use ingestion_core::config::ConfigError;

use crate::transport::TransportError;

/// Failure to open the broker connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Configuration was rejected before any connection attempt.
    #[error("invalid producer configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No broker answered within the connect timeout.
    #[error("brokers unreachable ({brokers}): {reason}")]
    Unreachable { brokers: String, reason: String },

    /// The broker client could not be constructed.
    #[error("failed to create producer client: {0}")]
    Client(String),
}

/// Failure to hand one message to the broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The handle is closing or closed.
    #[error("producer is shutting down")]
    Closing,

    #[error("failed to serialize message: {0}")]
    Serialization(String),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    /// The send queue stayed full for the whole enqueue timeout.
    #[error("send queue is full")]
    QueueFull,

    /// The broker client reported a (possibly temporary) failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller's cancellation fired while the send was blocked.
    #[error("send cancelled")]
    Cancelled,
}

impl SendError {
    /// Whether retrying the same message may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::QueueFull | SendError::Transport(_))
    }
}

impl From<TransportError> for SendError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::QueueFull => SendError::QueueFull,
            TransportError::Closed => SendError::Closing,
            TransportError::Broker(msg) => SendError::Transport(msg),
        }
    }
}

/// Final outcome of a failed publish.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A terminal send error; no retry was attempted.
    #[error("event rejected: {0}")]
    Rejected(#[source] SendError),

    #[error("publish cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("failed to publish event after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: SendError,
    },
}

impl PublishError {
    pub fn is_serialization(&self) -> bool {
        matches!(self, PublishError::Rejected(SendError::Serialization(_)))
    }

    /// Short machine-readable cause, used as a log field.
    pub fn cause(&self) -> &'static str {
        match self {
            PublishError::Rejected(SendError::Serialization(_)) => "serialization",
            PublishError::Rejected(SendError::Closing) => "closing",
            PublishError::Rejected(_) => "rejected",
            PublishError::Cancelled { .. } => "cancelled",
            PublishError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Failure while closing the producer.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("failed to close Kafka producer: {0}")]
    Close(String),

    #[error("shutdown did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}
