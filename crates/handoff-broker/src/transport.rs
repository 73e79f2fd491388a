//! [`Transport`] implementation backed by an [`InMemoryBroker`].

use crate::broker::InMemoryBroker;
use async_trait::async_trait;
use handoff_core::{
    BrokerError, BrokerResult, PartitionInfo, ProduceRecord, ProducerIdentity, TopicPartition,
    TransactionResult, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connects a producer session to a shared in-memory broker.
///
/// Each session should own its own transport: closing it only affects the
/// session that holds it, never the broker or other transports.
pub struct InMemoryTransport {
    broker: Arc<InMemoryBroker>,
    closed: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryTransport {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            closed: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Delay every RPC by `latency` before it reaches the broker.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn init_producer_id(
        &self,
        transactional_id: &str,
        transaction_timeout: Duration,
    ) -> BrokerResult<ProducerIdentity> {
        self.round_trip().await?;
        self.broker
            .handle_init_producer_id(transactional_id, transaction_timeout)
            .await
    }

    async fn add_partitions_to_txn(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partitions: &[TopicPartition],
    ) -> BrokerResult<()> {
        self.round_trip().await?;
        self.broker
            .handle_add_partitions(transactional_id, identity, partitions)
            .await
    }

    async fn produce(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partition: &TopicPartition,
        records: Vec<ProduceRecord>,
    ) -> BrokerResult<u64> {
        self.round_trip().await?;
        self.broker
            .handle_produce(transactional_id, identity, partition, records)
            .await
    }

    async fn end_txn(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        result: TransactionResult,
    ) -> BrokerResult<()> {
        self.round_trip().await?;
        self.broker
            .handle_end_txn(transactional_id, identity, result)
            .await
    }

    async fn partitions_for(&self, topic: &str) -> BrokerResult<Vec<PartitionInfo>> {
        self.round_trip().await?;
        self.broker.handle_partitions_for(topic).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("In-memory transport closed");
        }
    }
}
