//! Session configuration.
//!
//! A [`SessionConfig`] is normally assembled through
//! [`ProducerSession::builder()`](crate::ProducerSession::builder), but it can
//! also be deserialized with serde or read from Kafka-style properties:
//!
//! ```ignore
//! let mut props = HashMap::new();
//! props.insert("transactional.id".to_string(), "orders-sink-0".to_string());
//! props.insert("transaction.timeout.ms".to_string(), "900000".to_string());
//!
//! let config = SessionConfig::from_properties(&props)?;
//! ```

use crate::error::{Result, SessionError};
use handoff_core::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_DELIVERY_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer session configuration.
///
/// ## Configuration Fields
///
/// - `transactional_id`: Required. Stable identity of the logical producer.
/// - `bootstrap_servers`: Broker addresses handed to the transport (default: empty)
/// - `transaction_timeout`: How long the coordinator keeps a transaction open (default: 60s)
/// - `request_timeout`: Upper bound for every broker RPC (default: 30s)
/// - `max_batch_size`: Records per produce request (default: 100)
/// - `delivery_queue_capacity`: Sends buffered ahead of the delivery worker (default: 1024)
/// - `isolation_level`: Isolation for readers paired with this session (default: read_committed)
/// - `close_timeout`: Drain bound used when closing without an explicit timeout (default: 5s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stable identity across restarts. Never generated by the session.
    pub transactional_id: String,

    pub bootstrap_servers: Vec<String>,

    /// Transactions left open longer than this are aborted by the coordinator.
    ///
    /// Must exceed the longest gap between a failure and the resume that
    /// finishes the transaction, otherwise the resumed commit is fenced.
    pub transaction_timeout: Duration,

    /// Timeout for each individual broker request.
    ///
    /// A request that exceeds it fails with a retriable transport error.
    pub request_timeout: Duration,

    /// Maximum number of records per produce request.
    ///
    /// Consecutive sends to the same partition are grouped up to this size.
    pub max_batch_size: usize,

    /// Capacity of the queue between `send` and the delivery worker.
    ///
    /// `send` waits for space when the queue is full.
    pub delivery_queue_capacity: usize,

    pub isolation_level: IsolationLevel,

    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transactional_id: String::new(),
            bootstrap_servers: Vec::new(),
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            delivery_queue_capacity: DEFAULT_DELIVERY_QUEUE_CAPACITY,
            isolation_level: IsolationLevel::ReadCommitted,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new(transactional_id: impl Into<String>) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from Kafka producer properties.
    ///
    /// Recognized keys: `transactional.id`, `bootstrap.servers`,
    /// `transaction.timeout.ms`, `request.timeout.ms`, `batch.size`,
    /// `delivery.queue.capacity`, `isolation.level`. Other keys are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = SessionConfig::default();

        for (key, value) in properties {
            let value = value.trim();
            match key.as_str() {
                "transactional.id" => config.transactional_id = value.to_string(),
                "bootstrap.servers" => {
                    config.bootstrap_servers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                "transaction.timeout.ms" => {
                    config.transaction_timeout = Duration::from_millis(parse(key, value)?)
                }
                "request.timeout.ms" => {
                    config.request_timeout = Duration::from_millis(parse(key, value)?)
                }
                "batch.size" => config.max_batch_size = parse(key, value)?,
                "delivery.queue.capacity" => config.delivery_queue_capacity = parse(key, value)?,
                "isolation.level" => {
                    config.isolation_level = value.parse().map_err(SessionError::Config)?
                }
                _ => debug!(key = %key, "Ignoring unsupported producer property"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.transactional_id.trim().is_empty() {
            return Err(SessionError::Config(
                "transactional_id must not be empty".to_string(),
            ));
        }
        if self.transaction_timeout.is_zero() {
            return Err(SessionError::Config(
                "transaction_timeout must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SessionError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(SessionError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.delivery_queue_capacity == 0 {
            return Err(SessionError::Config(
                "delivery_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SessionError::Config(format!("invalid value '{}' for {}", value, key)))
}
