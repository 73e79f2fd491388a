//! In-Memory Broker
//!
//! Couples the [`TransactionCoordinator`] with per-partition logs behind a
//! single lock, so every coordinator decision and the markers it implies are
//! applied atomically.
//!
//! ## Fault Injection
//!
//! - [`InMemoryBroker::set_available`]: while unavailable, every producer RPC
//!   fails with `BrokerError::Unavailable` and leaves state untouched.
//! - [`InMemoryBroker::restart_coordinator`]: simulates a coordinator failover.
//!   Transaction state is durable and survives; only the generation counter
//!   changes.
//!
//! ## Usage
//!
//! ```ignore
//! let broker = InMemoryBroker::new_shared(BrokerConfig::default());
//! broker.create_topic("orders", 3).await?;
//!
//! let transport = InMemoryTransport::new(broker.clone());
//! let reader = CommittedReader::new(broker.clone());
//! ```

use crate::config::BrokerConfig;
use crate::coordinator::{
    CompletedTransaction, CoordinatorStats, EndTxnOutcome, TransactionCoordinator,
    TransactionMetadata,
};
use crate::error::{CoordinatorError, Result};
use crate::log::{PartitionLog, VisibleRecord};
use handoff_core::{
    BrokerError, BrokerResult, IsolationLevel, PartitionInfo, ProduceRecord, ProducerIdentity,
    TopicPartition, TransactionResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BROKER_ID: i32 = 0;

struct BrokerState {
    topics: HashMap<String, Vec<PartitionLog>>,
    coordinator: TransactionCoordinator,
}

impl BrokerState {
    fn partition_mut(&mut self, partition: &TopicPartition) -> BrokerResult<&mut PartitionLog> {
        let log = match (
            self.topics.get_mut(&partition.topic),
            usize::try_from(partition.partition),
        ) {
            (Some(logs), Ok(index)) => logs.get_mut(index),
            _ => None,
        };
        log.ok_or_else(|| BrokerError::UnknownTopicOrPartition {
            topic: partition.topic.clone(),
            partition: partition.partition,
        })
    }

    fn write_markers(&mut self, completed: &CompletedTransaction) {
        for partition in &completed.partitions {
            match self.partition_mut(partition) {
                Ok(log) => {
                    let offset = log.append_marker(completed.producer_id, completed.result);
                    debug!(
                        transactional_id = %completed.transactional_id,
                        partition = %partition,
                        offset,
                        result = %completed.result,
                        "Wrote transaction marker"
                    );
                }
                Err(_) => warn!(
                    transactional_id = %completed.transactional_id,
                    partition = %partition,
                    "Skipping marker for deleted partition"
                ),
            }
        }
    }

    fn ensure_topic(&mut self, topic: &str, config: &BrokerConfig) {
        if config.auto_create_topics && !self.topics.contains_key(topic) {
            let partitions = config.default_partitions.max(1);
            info!(topic, partitions, "Auto-creating topic");
            self.topics.insert(
                topic.to_string(),
                (0..partitions).map(|_| PartitionLog::new()).collect(),
            );
        }
    }
}

pub struct InMemoryBroker {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
    available: AtomicBool,
    coordinator_generation: AtomicU64,
}

impl InMemoryBroker {
    pub fn new(config: BrokerConfig) -> Self {
        let coordinator = TransactionCoordinator::new(config.max_transaction_timeout);
        Self {
            config,
            state: Mutex::new(BrokerState {
                topics: HashMap::new(),
                coordinator,
            }),
            available: AtomicBool::new(true),
            coordinator_generation: AtomicU64::new(0),
        }
    }

    /// Create a broker wrapped in an Arc for sharing between transports and readers.
    pub fn new_shared(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn create_topic(&self, name: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(CoordinatorError::InvalidPartitionCount {
                topic: name.to_string(),
                count: partitions,
            });
        }

        let mut state = self.state.lock().await;
        if state.topics.contains_key(name) {
            return Err(CoordinatorError::TopicAlreadyExists(name.to_string()));
        }
        state.topics.insert(
            name.to_string(),
            (0..partitions).map(|_| PartitionLog::new()).collect(),
        );
        info!(topic = name, partitions, "Created topic");
        Ok(())
    }

    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.topics.remove(name).is_none() {
            return Err(CoordinatorError::TopicNotFound(name.to_string()));
        }
        info!(topic = name, "Deleted topic");
        Ok(())
    }

    pub fn set_available(&self, available: bool) {
        let was = self.available.swap(available, Ordering::SeqCst);
        if was != available {
            warn!(available, "Broker availability changed");
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Simulate coordinator failover. Transaction state is preserved.
    pub async fn restart_coordinator(&self) {
        // Hold the lock so no request straddles the restart
        let _state = self.state.lock().await;
        let generation = self.coordinator_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Coordinator restarted");
    }

    pub fn coordinator_generation(&self) -> u64 {
        self.coordinator_generation.load(Ordering::SeqCst)
    }

    /// Append records outside of any transaction. Returns the base offset.
    pub async fn append_non_transactional(
        &self,
        partition: &TopicPartition,
        records: Vec<ProduceRecord>,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let log = state
            .partition_mut(partition)
            .map_err(|_| CoordinatorError::PartitionNotFound {
                topic: partition.topic.clone(),
                partition: partition.partition,
            })?;
        Ok(log.append(None, records))
    }

    /// Abort transactions that exceeded their timeout and write abort markers.
    ///
    /// Returns the transactional ids that were expired.
    pub async fn expire_transactions(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        let expired = state.coordinator.expire_transactions();
        for completed in &expired {
            state.write_markers(completed);
        }
        expired.into_iter().map(|c| c.transactional_id).collect()
    }

    /// Run `expire_transactions` on a fixed interval until the broker is dropped.
    pub fn spawn_expiry_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let broker = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(broker) = broker.upgrade() else {
                    break;
                };
                let expired = broker.expire_transactions().await;
                if !expired.is_empty() {
                    debug!(count = expired.len(), "Expired transactions");
                }
            }
        })
    }

    pub async fn describe_transaction(&self, transactional_id: &str) -> Option<TransactionMetadata> {
        self.state.lock().await.coordinator.describe(transactional_id)
    }

    pub async fn coordinator_stats(&self) -> CoordinatorStats {
        self.state.lock().await.coordinator.stats()
    }

    pub async fn high_watermark(&self, partition: &TopicPartition) -> Result<u64> {
        self.with_partition(partition, |log| log.high_watermark()).await
    }

    pub async fn last_stable_offset(&self, partition: &TopicPartition) -> Result<u64> {
        self.with_partition(partition, |log| log.last_stable_offset())
            .await
    }

    /// Read every partition of `topic` at the given isolation level.
    pub async fn read_topic(
        &self,
        topic: &str,
        isolation: IsolationLevel,
    ) -> Result<Vec<(i32, Vec<VisibleRecord>)>> {
        let state = self.state.lock().await;
        let logs = state
            .topics
            .get(topic)
            .ok_or_else(|| CoordinatorError::TopicNotFound(topic.to_string()))?;
        Ok(logs
            .iter()
            .enumerate()
            .map(|(partition, log)| (partition as i32, log.read(isolation)))
            .collect())
    }

    async fn with_partition<T>(
        &self,
        partition: &TopicPartition,
        f: impl FnOnce(&PartitionLog) -> T,
    ) -> Result<T> {
        let mut state = self.state.lock().await;
        let log = state
            .partition_mut(partition)
            .map_err(|_| CoordinatorError::PartitionNotFound {
                topic: partition.topic.clone(),
                partition: partition.partition,
            })?;
        Ok(f(log))
    }

    fn check_available(&self) -> BrokerResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable(
                "transaction coordinator is not available".to_string(),
            ))
        }
    }

    // Producer RPC handlers

    pub async fn handle_init_producer_id(
        &self,
        transactional_id: &str,
        transaction_timeout: Duration,
    ) -> BrokerResult<ProducerIdentity> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let outcome = state
            .coordinator
            .init_producer_id(transactional_id, transaction_timeout);
        if let Some(aborted) = &outcome.aborted {
            state.write_markers(aborted);
        }
        Ok(outcome.identity)
    }

    pub async fn handle_add_partitions(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partitions: &[TopicPartition],
    ) -> BrokerResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        for partition in partitions {
            state.ensure_topic(&partition.topic, &self.config);
            state.partition_mut(partition)?;
        }
        state
            .coordinator
            .add_partitions(transactional_id, identity, partitions)
    }

    pub async fn handle_produce(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partition: &TopicPartition,
        records: Vec<ProduceRecord>,
    ) -> BrokerResult<u64> {
        self.check_available()?;

        if let Some(oversized) = records
            .iter()
            .find(|r| r.size() > self.config.max_record_bytes)
        {
            return Err(BrokerError::RecordTooLarge {
                size: oversized.size(),
                max: self.config.max_record_bytes,
            });
        }

        let mut state = self.state.lock().await;
        state
            .coordinator
            .check_produce(transactional_id, identity, partition)?;
        let count = records.len();
        let base_offset = state
            .partition_mut(partition)?
            .append(Some(identity.producer_id), records);
        debug!(
            transactional_id,
            partition = %partition,
            base_offset,
            count,
            "Appended transactional records"
        );
        Ok(base_offset)
    }

    pub async fn handle_end_txn(
        &self,
        transactional_id: &str,
        identity: ProducerIdentity,
        result: TransactionResult,
    ) -> BrokerResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        match state.coordinator.end_txn(transactional_id, identity, result)? {
            EndTxnOutcome::Completed(completed) => state.write_markers(&completed),
            EndTxnOutcome::NoOp => {}
        }
        Ok(())
    }

    pub async fn handle_partitions_for(&self, topic: &str) -> BrokerResult<Vec<PartitionInfo>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.ensure_topic(topic, &self.config);
        let logs = state
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopicOrPartition {
                topic: topic.to_string(),
                partition: -1,
            })?;
        Ok((0..logs.len())
            .map(|partition| PartitionInfo {
                topic: topic.to_string(),
                partition: partition as i32,
                leader: Some(BROKER_ID),
            })
            .collect())
    }
}
