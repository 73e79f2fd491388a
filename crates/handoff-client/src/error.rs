//! Error types for producer session operations.
//!
//! Two error types cover everything a session can report:
//!
//! - [`SessionError`]: returned synchronously by session operations
//!   (`initialize`, `begin_transaction`, `commit_transaction`, ...).
//! - [`DeliveryError`]: delivered through a send's completion
//!   (`DeliveryFuture` or callback) when a record is not acknowledged.
//!
//! ## Error Classes
//!
//! Every error exposes [`ErrorClass`] through `class()`:
//!
//! - **Retriable**: broker unreachable or slow. Repeating the operation may
//!   succeed. The outcome of an interrupted commit/abort is unknown until it
//!   is retried, here or from a resumed session.
//! - **Fatal**: the broker rejected the request for good. A fenced producer
//!   must stop; a newer instance owns the transactional id.
//! - **Programmer**: the call was not legal in the session's current state,
//!   or the configuration is invalid. Never retry without changing the code.
//!
//! ## Examples
//!
//! ```ignore
//! use handoff_client::{ErrorClass, SessionError};
//!
//! match session.commit_transaction().await {
//!     Ok(()) => {}
//!     Err(e) if e.class() == ErrorClass::Retriable => {
//!         // session is still in the transaction; retry later or resume elsewhere
//!     }
//!     Err(SessionError::Fenced { .. }) => {
//!         // another instance took over, shut down
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use crate::state::SessionState;
use handoff_core::{BrokerError, ProducerIdentity};
use thiserror::Error;

/// Convenience type alias for `Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Coarse classification used to decide how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    Fatal,
    Programmer,
}

/// Error returned by producer session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation is not legal in the session's current state.
    ///
    /// Raised before any side effect. Calling `resume` after `initialize`,
    /// `send` outside a transaction, or anything after `close` ends up here.
    #[error("Cannot {operation} while session is {state}")]
    IllegalState {
        operation: &'static str,
        state: SessionState,
    },

    /// Broker unreachable, request timed out or connection closed.
    ///
    /// The session does not retry on its own.
    #[error("Transport error: {0}")]
    Transport(BrokerError),

    /// A newer producer epoch exists for this transactional id.
    #[error(
        "Producer fenced: transactional id '{transactional_id}' (producer {producer_id}, epoch {epoch}) has been superseded"
    )]
    Fenced {
        transactional_id: String,
        producer_id: i64,
        epoch: i16,
    },

    /// Broker-confirmed rejection that retrying cannot fix.
    ///
    /// Covers invalid transaction state, unknown producer id mapping and an
    /// epoch the broker never issued.
    #[error("Broker rejected request: {0}")]
    Fatal(BrokerError),

    #[error("Topic '{0}' does not exist")]
    UnknownTopic(String),

    /// A record could not be delivered.
    ///
    /// Produced when a caller propagates a completion result with `?`.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Invalid session configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error that shouldn't normally occur.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub(crate) fn illegal_state(operation: &'static str, state: SessionState) -> Self {
        SessionError::IllegalState { operation, state }
    }

    /// Translate a broker failure for a request made as `identity`.
    pub fn from_broker(
        err: BrokerError,
        transactional_id: &str,
        identity: Option<ProducerIdentity>,
    ) -> Self {
        match err {
            BrokerError::Unavailable(_)
            | BrokerError::RequestTimedOut(_)
            | BrokerError::ConnectionClosed => SessionError::Transport(err),
            BrokerError::ProducerFenced { epoch, .. } => SessionError::Fenced {
                transactional_id: transactional_id.to_string(),
                producer_id: identity.map(|id| id.producer_id).unwrap_or(-1),
                epoch: identity.map(|id| id.epoch).unwrap_or(epoch),
            },
            BrokerError::UnknownTopicOrPartition { topic, .. } => SessionError::UnknownTopic(topic),
            other => SessionError::Fatal(other),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Transport(_) => ErrorClass::Retriable,
            SessionError::Fenced { .. } | SessionError::Fatal(_) | SessionError::Internal(_) => {
                ErrorClass::Fatal
            }
            SessionError::Delivery(e) => e.class(),
            SessionError::IllegalState { .. }
            | SessionError::UnknownTopic(_)
            | SessionError::Config(_) => ErrorClass::Programmer,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.class() == ErrorClass::Retriable
    }

    pub fn is_fenced(&self) -> bool {
        matches!(
            self,
            SessionError::Fenced { .. } | SessionError::Delivery(DeliveryError::Fenced { .. })
        )
    }
}

/// Why a record was not acknowledged.
///
/// Cloneable so a single failure (for example a fenced producer) can be
/// reported to every record of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error(
        "Producer fenced: transactional id '{transactional_id}' (producer {producer_id}, epoch {epoch}) has been superseded"
    )]
    Fenced {
        transactional_id: String,
        producer_id: i64,
        epoch: i16,
    },

    #[error("Record of {size} bytes exceeds the maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Unknown topic or partition: {topic}/{partition}")]
    UnknownTopicOrPartition { topic: String, partition: i32 },

    #[error("Transport error: {0}")]
    Transport(BrokerError),

    #[error("Broker rejected records: {0}")]
    Rejected(BrokerError),

    /// The session closed before the record was acknowledged.
    #[error("Delivery abandoned: session closed before acknowledgment")]
    Abandoned,
}

impl DeliveryError {
    pub fn from_broker(err: BrokerError, transactional_id: &str, identity: ProducerIdentity) -> Self {
        match err {
            BrokerError::Unavailable(_)
            | BrokerError::RequestTimedOut(_)
            | BrokerError::ConnectionClosed => DeliveryError::Transport(err),
            BrokerError::ProducerFenced { .. } => DeliveryError::Fenced {
                transactional_id: transactional_id.to_string(),
                producer_id: identity.producer_id,
                epoch: identity.epoch,
            },
            BrokerError::RecordTooLarge { size, max } => DeliveryError::RecordTooLarge { size, max },
            BrokerError::UnknownTopicOrPartition { topic, partition } => {
                DeliveryError::UnknownTopicOrPartition { topic, partition }
            }
            other => DeliveryError::Rejected(other),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DeliveryError::Transport(_) => ErrorClass::Retriable,
            DeliveryError::Fenced { .. } | DeliveryError::Rejected(_) | DeliveryError::Abandoned => {
                ErrorClass::Fatal
            }
            DeliveryError::RecordTooLarge { .. } | DeliveryError::UnknownTopicOrPartition { .. } => {
                ErrorClass::Programmer
            }
        }
    }

    /// Whether this failure ends the session's ability to make progress.
    pub(crate) fn is_terminal(&self) -> bool {
        match self {
            DeliveryError::Fenced { .. } => true,
            DeliveryError::Rejected(err) => err.is_fencing(),
            _ => false,
        }
    }

    /// The session-level error a terminal delivery failure surfaces as.
    pub(crate) fn into_session_error(self) -> SessionError {
        match self {
            DeliveryError::Fenced {
                transactional_id,
                producer_id,
                epoch,
            } => SessionError::Fenced {
                transactional_id,
                producer_id,
                epoch,
            },
            DeliveryError::Rejected(err) => SessionError::Fatal(err),
            other => SessionError::Delivery(other),
        }
    }
}
