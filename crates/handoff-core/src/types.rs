//! Shared Data Types
//!
//! Values exchanged between a producer session and the broker.
//!
//! ## Producer Identity
//! A [`ProducerIdentity`] is the `(producer_id, epoch)` pair the broker assigns
//! to a transactional id. It is immutable and `Copy`: a session passes it by
//! value on every RPC instead of mutating shared client state. Epochs only ever
//! increase for a given transactional id, and once a newer epoch exists the
//! broker rejects writes from the older one.
//!
//! ## Records
//! [`ProduceRecord`] is the broker-facing form of a record: already serialized
//! to `bytes::Bytes` and routed to a concrete [`TopicPartition`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broker-assigned identity of a transactional producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerIdentity {
    pub producer_id: i64,
    pub epoch: i16,
}

impl ProducerIdentity {
    pub fn new(producer_id: i64, epoch: i16) -> Self {
        Self { producer_id, epoch }
    }

    /// Same producer id, next epoch.
    pub fn bump(self) -> Self {
        Self {
            producer_id: self.producer_id,
            epoch: self.epoch.wrapping_add(1),
        }
    }
}

impl fmt::Display for ProducerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.producer_id, self.epoch)
    }
}

/// A single partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Partition metadata returned by `partitions_for`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub topic: String,
    pub partition: i32,
    /// Broker currently leading the partition, if known.
    pub leader: Option<i32>,
}

/// A serialized record addressed to a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRecord {
    pub key: Option<Bytes>,
    pub value: Bytes,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ProduceRecord {
    pub fn new(key: Option<Bytes>, value: Bytes, timestamp: i64) -> Self {
        Self {
            key,
            value,
            timestamp,
        }
    }

    /// Bytes counted against the broker's record size limit.
    pub fn size(&self) -> usize {
        self.key.as_ref().map(|k| k.len()).unwrap_or(0) + self.value.len()
    }
}

/// Visibility of transactional records to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Only records from committed transactions (and non-transactional records).
    #[default]
    ReadCommitted,
    /// Every appended record, including open and aborted transactions.
    ReadUncommitted,
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            other => Err(format!("unknown isolation level '{}'", other)),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read_committed"),
            IsolationLevel::ReadUncommitted => write!(f, "read_uncommitted"),
        }
    }
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResult {
    Commit,
    Abort,
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionResult::Commit => write!(f, "commit"),
            TransactionResult::Abort => write!(f, "abort"),
        }
    }
}
