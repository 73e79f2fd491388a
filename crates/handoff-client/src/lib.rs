//! Handoff Client - Resumable Transactional Producer
//!
//! This crate provides [`ProducerSession`], a transactional producer whose
//! in-flight transaction can be handed off to another session after a failure.
//! The replacement adopts the original `(producer_id, epoch)` with
//! [`ProducerSession::resume`] and commits or aborts what the original wrote.
//! The broker's epoch fencing guarantees no transaction is committed twice and
//! no two live producers write under the same identity.
//!
//! # Examples
//!
//! ## Producing in a transaction
//!
//! ```ignore
//! use handoff_client::{ProducerRecord, ProducerSession};
//!
//! let mut session = ProducerSession::builder()
//!     .transactional_id("orders-sink-0")
//!     .transport(transport)
//!     .build()?;
//!
//! session.initialize().await?;
//! session.begin_transaction().await?;
//! session.send(ProducerRecord::new("orders", "order data").with_key("user123")).await?;
//! session.commit_transaction().await?;
//! ```
//!
//! ## Handing off an open transaction
//!
//! ```ignore
//! // Session A wrote and flushed, then its process died.
//! let token = session_a.resume_token()?;
//!
//! let mut session_b = ProducerSession::builder()
//!     .transactional_id("orders-sink-0")
//!     .transport(transport)
//!     .build()?;
//! session_b.resume_from(&token).await?;
//! session_b.commit_transaction().await?;
//! ```
//!
//! # Features
//!
//! - **Epoch fencing**: a superseded session's writes fail with `Fenced`
//! - **Idempotent completion**: repeating a commit or abort is harmless
//! - **Batching**: sends are grouped per partition by a background worker
//! - **Key partitioning**: SipHash of the key, round-robin without one
//! - **Recovery helper**: [`recover_transaction`] with jittered retries

pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod record;
pub mod recovery;
pub mod retry;
pub mod session;
pub mod state;
pub mod stats;

pub use config::SessionConfig;
pub use delivery::{DeliveryCallback, DeliveryFuture, DeliveryResult};
pub use error::{DeliveryError, ErrorClass, Result, SessionError};
pub use record::{BytesSerializer, ProducerRecord, RecordMetadata, RecordSerializer, StringSerializer};
pub use recovery::{recover_transaction, ResumeToken};
pub use retry::RetryPolicy;
pub use session::{ProducerSession, ProducerSessionBuilder};
pub use state::SessionState;
pub use stats::SessionStats;

pub use handoff_core::{
    BrokerError, IsolationLevel, PartitionInfo, ProducerIdentity, TopicPartition,
    TransactionResult, Transport,
};
