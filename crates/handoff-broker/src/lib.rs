//! Handoff In-Memory Broker
//!
//! A single-process broker that implements the transactional producer
//! protocol closely enough to exercise a producer session end to end:
//!
//! - **Coordinator**: producer id assignment, epoch fencing, transaction
//!   state per transactional id, idempotent completion and timeout expiry
//! - **Partition logs**: append-only logs with commit/abort markers
//! - **Committed reader**: `read_committed` / `read_uncommitted` views
//! - **Transport**: an `InMemoryTransport` implementing `handoff_core::Transport`
//!
//! Nothing here is persisted. The broker exists for tests, demos and local
//! development; it is not a production coordinator.
//!
//! ## Example
//!
//! ```ignore
//! use handoff_broker::{BrokerConfig, CommittedReader, InMemoryBroker, InMemoryTransport};
//!
//! let broker = InMemoryBroker::new_shared(BrokerConfig::default());
//! broker.create_topic("orders", 3).await?;
//!
//! let transport = InMemoryTransport::new(broker.clone());
//! // hand `transport` to a producer session ...
//!
//! let visible = CommittedReader::new(broker).read_committed("orders").await?;
//! ```

pub mod broker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod log;
pub mod reader;
pub mod transport;

pub use broker::InMemoryBroker;
pub use config::BrokerConfig;
pub use coordinator::{
    CoordinatorStats, EndTxnOutcome, TransactionCoordinator, TransactionMetadata, TxnState,
};
pub use error::{CoordinatorError, Result};
pub use log::{LogEntry, PartitionLog};
pub use reader::{CommittedReader, ConsumedRecord};
pub use transport::InMemoryTransport;
