//! Broker Administration Errors
//!
//! Errors returned by administrative operations on the in-memory broker
//! (topic management, direct log access, committed reads).
//!
//! Broker RPCs made on behalf of a producer never use this type; they return
//! [`handoff_core::BrokerError`] so the client sees the same tagged failures a
//! remote broker would report.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Partition not found: {topic}/{partition}")]
    PartitionNotFound { topic: String, partition: i32 },

    #[error("Invalid partition count {count} for topic {topic}")]
    InvalidPartitionCount { topic: String, count: u32 },
}
