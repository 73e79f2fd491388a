//! Committed Reader
//!
//! A minimal consumer over the in-memory broker used to observe what a
//! downstream application would see. It has no group membership or offset
//! tracking: every call reads each partition of the topic from the beginning.

use crate::broker::InMemoryBroker;
use crate::error::Result;
use bytes::Bytes;
use handoff_core::IsolationLevel;
use std::sync::Arc;

/// A record as delivered to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: u64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct CommittedReader {
    broker: Arc<InMemoryBroker>,
}

impl CommittedReader {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self { broker }
    }

    /// Read all visible records of `topic`, ordered by partition then offset.
    pub async fn read(&self, topic: &str, isolation: IsolationLevel) -> Result<Vec<ConsumedRecord>> {
        let partitions = self.broker.read_topic(topic, isolation).await?;
        Ok(partitions
            .into_iter()
            .flat_map(|(partition, records)| {
                records.into_iter().map(move |r| ConsumedRecord {
                    topic: topic.to_string(),
                    partition,
                    offset: r.offset,
                    key: r.key,
                    value: r.value,
                    timestamp: r.timestamp,
                })
            })
            .collect())
    }

    pub async fn read_committed(&self, topic: &str) -> Result<Vec<ConsumedRecord>> {
        self.read(topic, IsolationLevel::ReadCommitted).await
    }
}
