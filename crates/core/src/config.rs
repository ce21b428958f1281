//! Broker producer configuration.
//!
//! [`ProducerConfig`] is the raw, environment-shaped configuration. Acks and
//! compression stay as strings there; [`ProducerSettings::try_from`] turns
//! them into typed values and is the single validation point, run by the
//! producer before it attempts to connect.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("{key} must be a valid {expected}, got '{value}'")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("at least one broker must be specified")]
    NoBrokers,

    #[error("topic must be specified")]
    NoTopic,

    #[error("invalid acks value: {0}")]
    InvalidAcks(String),

    #[error("invalid compression: {0}")]
    InvalidCompression(String),

    #[error("invalid transport: {0}")]
    InvalidTransport(String),

    /// A numeric setting that must be strictly positive was zero.
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

// ---------------------------------------------------------------------------
// Acks / Compression / TransportKind
// ---------------------------------------------------------------------------

/// Durability level requested from the broker for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// Fire and forget (`0`).
    None,
    /// Partition leader only (`1`).
    Leader,
    /// All in-sync replicas (`all`).
    All,
}

impl Acks {
    /// Value as understood by the broker client (`0`, `1`, `all`).
    pub fn as_str(self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::Leader => "1",
            Acks::All => "all",
        }
    }
}

impl FromStr for Acks {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Acks::None),
            "1" => Ok(Acks::Leader),
            "all" => Ok(Acks::All),
            other => Err(ConfigError::InvalidAcks(other.to_string())),
        }
    }
}

impl fmt::Display for Acks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            other => Err(ConfigError::InvalidCompression(other.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which broker client backs the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A real Kafka cluster via librdkafka.
    Kafka,
    /// The in-process broker; nothing leaves the process.
    Memory,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kafka" => Ok(TransportKind::Kafka),
            "memory" => Ok(TransportKind::Memory),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ProducerConfig
// ---------------------------------------------------------------------------

/// Producer configuration as loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// `0`, `1` or `all`.
    pub acks: String,
    /// Retry ceiling, shared by the broker client and the publish orchestrator.
    pub retries: u32,
    /// Maximum bytes buffered per batch before a flush.
    pub batch_size: usize,
    /// Maximum time a message waits in the buffer.
    pub linger_ms: u64,
    /// `none`, `gzip`, `snappy`, `lz4` or `zstd`.
    pub compression: String,
    pub max_message_bytes: usize,
    /// How long a send may block on a full queue before giving up.
    pub enqueue_timeout_ms: u64,
    /// Bound on the broker reachability probe during connect.
    pub connect_timeout_ms: u64,
    pub transport: TransportKind,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "user-activity-events".to_string(),
            acks: "all".to_string(),
            retries: 3,
            batch_size: 16_384,
            linger_ms: 5,
            compression: "snappy".to_string(),
            max_message_bytes: 1_000_000,
            enqueue_timeout_ms: 1_000,
            connect_timeout_ms: 5_000,
            transport: TransportKind::Kafka,
        }
    }
}

impl ProducerConfig {
    /// Load configuration from a variable lookup, falling back to defaults.
    ///
    /// | Var                         | Default                |
    /// |-----------------------------|------------------------|
    /// | `KAFKA_BROKERS`             | `localhost:9092`       |
    /// | `KAFKA_TOPIC`               | `user-activity-events` |
    /// | `KAFKA_ACKS`                | `all`                  |
    /// | `KAFKA_RETRIES`             | `3`                    |
    /// | `KAFKA_BATCH_SIZE`          | `16384`                |
    /// | `KAFKA_LINGER_MS`           | `5`                    |
    /// | `KAFKA_COMPRESSION`         | `snappy`               |
    /// | `KAFKA_MAX_MESSAGE_BYTES`   | `1000000`              |
    /// | `KAFKA_ENQUEUE_TIMEOUT_MS`  | `1000`                 |
    /// | `KAFKA_CONNECT_TIMEOUT_MS`  | `5000`                 |
    /// | `KAFKA_TRANSPORT`           | `kafka`                |
    ///
    /// Empty values count as unset. Acks and compression are not checked
    /// here; see [`ProducerSettings::try_from`].
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let brokers = match get("KAFKA_BROKERS") {
            Some(list) => parse_brokers(&list),
            None => defaults.brokers,
        };

        let transport = match get("KAFKA_TRANSPORT") {
            Some(kind) => kind.trim().parse()?,
            None => defaults.transport,
        };

        Ok(Self {
            brokers,
            topic: get("KAFKA_TOPIC").unwrap_or(defaults.topic),
            acks: get("KAFKA_ACKS").unwrap_or(defaults.acks),
            retries: parse_var(&get, "KAFKA_RETRIES", defaults.retries)?,
            batch_size: parse_var(&get, "KAFKA_BATCH_SIZE", defaults.batch_size)?,
            linger_ms: parse_var(&get, "KAFKA_LINGER_MS", defaults.linger_ms)?,
            compression: get("KAFKA_COMPRESSION").unwrap_or(defaults.compression),
            max_message_bytes: parse_var(
                &get,
                "KAFKA_MAX_MESSAGE_BYTES",
                defaults.max_message_bytes,
            )?,
            enqueue_timeout_ms: parse_var(
                &get,
                "KAFKA_ENQUEUE_TIMEOUT_MS",
                defaults.enqueue_timeout_ms,
            )?,
            connect_timeout_ms: parse_var(
                &get,
                "KAFKA_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            transport,
        })
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }
}

/// Split a comma-separated broker list, dropping blanks.
pub fn parse_brokers(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `key` via `get`, falling back to `default` when it is unset.
pub fn parse_var<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            expected: std::any::type_name::<T>(),
        }),
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// ProducerSettings
// ---------------------------------------------------------------------------

/// Validated, typed producer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    pub acks: Acks,
    pub retries: u32,
    pub batch_size: usize,
    pub linger: Duration,
    pub compression: Compression,
    pub max_message_bytes: usize,
    pub enqueue_timeout: Duration,
    pub connect_timeout: Duration,
}

impl TryFrom<&ProducerConfig> for ProducerSettings {
    type Error = ConfigError;

    fn try_from(config: &ProducerConfig) -> Result<Self, Self::Error> {
        let acks: Acks = config.acks.parse()?;
        let compression: Compression = config.compression.parse()?;

        if config.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::NoBrokers);
        }
        if config.topic.trim().is_empty() {
            return Err(ConfigError::NoTopic);
        }
        if config.batch_size == 0 {
            return Err(ConfigError::NotPositive("batch size"));
        }
        if config.max_message_bytes == 0 {
            return Err(ConfigError::NotPositive("max message bytes"));
        }

        Ok(Self {
            brokers: config
                .brokers
                .iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            topic: config.topic.trim().to_string(),
            acks,
            retries: config.retries,
            batch_size: config.batch_size,
            linger: Duration::from_millis(config.linger_ms),
            compression,
            max_message_bytes: config.max_message_bytes,
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        })
    }
}
