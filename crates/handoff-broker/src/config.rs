//! Broker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational limits of the in-memory broker.
///
/// ## Configuration Fields
///
/// - `max_transaction_timeout`: Upper bound for a producer's requested timeout (default: 15min)
/// - `max_record_bytes`: Largest accepted key + value size (default: 1 MiB)
/// - `default_partitions`: Partition count for auto-created topics (default: 1)
/// - `auto_create_topics`: Create unknown topics on first use (default: false)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Requests for longer transaction timeouts are clamped to this value.
    pub max_transaction_timeout: Duration,

    /// Records larger than this are rejected with `RecordTooLarge`.
    pub max_record_bytes: usize,

    pub default_partitions: u32,

    /// When set, metadata lookups and produce requests for a missing topic
    /// create it with `default_partitions` partitions.
    pub auto_create_topics: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_transaction_timeout: Duration::from_secs(15 * 60),
            max_record_bytes: 1024 * 1024,
            default_partitions: 1,
            auto_create_topics: false,
        }
    }
}
