//! Broker Error Types
//!
//! Every broker RPC made through a [`Transport`](crate::Transport) returns a
//! [`BrokerResult`]. Failures are tagged variants rather than boolean flags so
//! callers can branch on exactly what the broker confirmed.
//!
//! ## Error Categories
//!
//! ### Connectivity (retriable)
//! - `Unavailable`: broker or coordinator cannot be reached
//! - `RequestTimedOut`: no response within the request timeout
//! - `ConnectionClosed`: the transport was closed underneath the caller
//!
//! ### Fencing
//! - `ProducerFenced`: a newer epoch exists for the transactional id
//! - `InvalidProducerEpoch`: the request carries an epoch the broker never issued
//! - `InvalidProducerIdMapping`: the producer id is not bound to the transactional id
//!
//! ### Transaction state
//! - `InvalidTxnState`: the coordinator's transaction state forbids the request
//!
//! ### Data
//! - `UnknownTopicOrPartition`: destination does not exist
//! - `RecordTooLarge`: a record exceeds the broker's size limit
//!
//! ## Wire Codes
//!
//! [`ErrorCode`] carries the Kafka protocol numbering so transports that speak
//! a Kafka-compatible protocol can translate response codes directly.

use std::time::Duration;
use thiserror::Error;

/// Result type for broker RPCs.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Failure reported by the broker (or by the transport on its behalf).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out after {0:?}")]
    RequestTimedOut(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error(
        "Producer fenced: transactional id '{transactional_id}' epoch {epoch} superseded by epoch {current_epoch}"
    )]
    ProducerFenced {
        transactional_id: String,
        epoch: i16,
        current_epoch: i16,
    },

    #[error("Invalid producer epoch {epoch} for transactional id '{transactional_id}'")]
    InvalidProducerEpoch { transactional_id: String, epoch: i16 },

    #[error("Producer id {producer_id} is not mapped to transactional id '{transactional_id}'")]
    InvalidProducerIdMapping {
        transactional_id: String,
        producer_id: i64,
    },

    #[error("Invalid transaction state: {0}")]
    InvalidTxnState(String),

    #[error("Unknown topic or partition: {topic}/{partition}")]
    UnknownTopicOrPartition { topic: String, partition: i32 },

    #[error("Record of {size} bytes exceeds the maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },
}

impl BrokerError {
    /// Whether repeating the same request may succeed without any other change.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BrokerError::Unavailable(_)
                | BrokerError::RequestTimedOut(_)
                | BrokerError::ConnectionClosed
        )
    }

    /// Whether the error means this producer identity lost its authority.
    pub fn is_fencing(&self) -> bool {
        matches!(
            self,
            BrokerError::ProducerFenced { .. }
                | BrokerError::InvalidProducerEpoch { .. }
                | BrokerError::InvalidProducerIdMapping { .. }
        )
    }

    /// Kafka protocol error code for this failure.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

/// Kafka protocol error codes used by transactional producers.
/// See: https://kafka.apache.org/protocol#protocol_error_codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ErrorCode {
    None = 0,
    UnknownServerError = -1,
    UnknownTopicOrPartition = 3,
    RequestTimedOut = 7,
    BrokerNotAvailable = 8,
    MessageTooLarge = 10,
    NetworkException = 13,
    CoordinatorNotAvailable = 15,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    ProducerFenced = 90,
}

impl ErrorCode {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl From<&BrokerError> for ErrorCode {
    fn from(err: &BrokerError) -> Self {
        match err {
            BrokerError::Unavailable(_) => ErrorCode::CoordinatorNotAvailable,
            BrokerError::RequestTimedOut(_) => ErrorCode::RequestTimedOut,
            BrokerError::ConnectionClosed => ErrorCode::NetworkException,
            BrokerError::ProducerFenced { .. } => ErrorCode::ProducerFenced,
            BrokerError::InvalidProducerEpoch { .. } => ErrorCode::InvalidProducerEpoch,
            BrokerError::InvalidProducerIdMapping { .. } => ErrorCode::InvalidProducerIdMapping,
            BrokerError::InvalidTxnState(_) => ErrorCode::InvalidTxnState,
            BrokerError::UnknownTopicOrPartition { .. } => ErrorCode::UnknownTopicOrPartition,
            BrokerError::RecordTooLarge { .. } => ErrorCode::MessageTooLarge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_errors_are_retriable() {
        assert!(BrokerError::Unavailable("down".to_string()).is_retriable());
        assert!(BrokerError::RequestTimedOut(Duration::from_secs(1)).is_retriable());
        assert!(BrokerError::ConnectionClosed.is_retriable());
    }

    #[test]
    fn test_fencing_errors_are_not_retriable() {
        let fenced = BrokerError::ProducerFenced {
            transactional_id: "tx-1".to_string(),
            epoch: 0,
            current_epoch: 1,
        };
        assert!(!fenced.is_retriable());
        assert!(fenced.is_fencing());
        assert_eq!(fenced.code(), ErrorCode::ProducerFenced);
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            BrokerError::InvalidTxnState("x".to_string()).code().as_i16(),
            48
        );
        assert_eq!(
            BrokerError::RecordTooLarge { size: 10, max: 5 }.code(),
            ErrorCode::MessageTooLarge
        );
        assert_eq!(
            BrokerError::UnknownTopicOrPartition {
                topic: "t".to_string(),
                partition: 0
            }
            .code()
            .as_i16(),
            3
        );
    }

    #[test]
    fn test_display_includes_epochs() {
        let fenced = BrokerError::ProducerFenced {
            transactional_id: "tx-1".to_string(),
            epoch: 2,
            current_epoch: 3,
        };
        let msg = fenced.to_string();
        assert!(msg.contains("tx-1"));
        assert!(msg.contains("epoch 2"));
        assert!(msg.contains("epoch 3"));
    }
}
