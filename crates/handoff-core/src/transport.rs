//! Broker Transport
//!
//! The [`Transport`] trait is the only way a producer session talks to a
//! broker. Implementations own connection management and wire encoding; the
//! session owns the transaction state machine.
//!
//! The producer identity travels with every transactional RPC. There is no
//! "set identity" call: a session that resumes a transaction simply starts
//! sending the inherited `(producer_id, epoch)` and the broker validates it on
//! the first request.
//!
//! Beginning a transaction is not an RPC. The coordinator learns about a
//! transaction when the first partition is registered through
//! [`Transport::add_partitions_to_txn`].

use crate::error::BrokerResult;
use crate::types::{
    PartitionInfo, ProduceRecord, ProducerIdentity, TopicPartition, TransactionResult,
};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Obtain (or re-obtain) the identity for a transactional id.
    ///
    /// The broker bumps the epoch on every call, fencing any older instance
    /// and aborting a transaction it left open.
    async fn init_producer_id(
        &self,
        transactional_id: &str,
        transaction_timeout: Duration,
    ) -> BrokerResult<ProducerIdentity>;

    /// Register partitions with the ongoing transaction, starting one if needed.
    async fn add_partitions_to_txn(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partitions: &[TopicPartition],
    ) -> BrokerResult<()>;

    /// Append records to a registered partition. Returns the base offset.
    async fn produce(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partition: &TopicPartition,
        records: Vec<ProduceRecord>,
    ) -> BrokerResult<u64>;

    /// Commit or abort the transaction owned by `identity`.
    async fn end_txn(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        result: TransactionResult,
    ) -> BrokerResult<()>;

    async fn partitions_for(&self, topic: &str) -> BrokerResult<Vec<PartitionInfo>>;

    /// Release connections. Further calls may fail with `ConnectionClosed`.
    async fn close(&self) {}
}
