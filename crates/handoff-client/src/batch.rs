//! Batching Logic for the Delivery Worker
//!
//! The delivery worker drains whatever sends are queued and groups them into
//! per-partition batches so each produce request carries many records.
//!
//! ## Architecture
//!
//! ```text
//! queue: [a→p0, b→p1, c→p0, d→p0, e→p1]      (max_batch_size = 2)
//!                    │
//!                    ▼
//! ┌──────────────────────────────┐
//! │  BatchAccumulator            │
//! │  p0: [a, c]  [d]             │
//! │  p1: [b, e]                  │
//! └──────┬───────────────────────┘
//!        │ drain()
//!        ▼
//! [(p0, [a, c]), (p1, [b, e]), (p0, [d])]
//! ```
//!
//! ## Ordering
//!
//! Records for the same partition keep their submission order, both within a
//! batch and across batches. Batches come out in the order their first record
//! was pushed. No ordering is promised between different partitions.
//!
//! ## Thread Safety
//!
//! Not thread-safe. Owned by the single delivery worker task.

use handoff_core::TopicPartition;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Groups items into per-partition batches of bounded size.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    batches: Vec<(TopicPartition, Vec<T>)>,
    /// Index of the batch currently accepting records for each partition.
    open: HashMap<TopicPartition, usize>,
    max_batch_size: usize,
}

impl<T> BatchAccumulator<T> {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            batches: Vec::new(),
            open: HashMap::new(),
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn push(&mut self, partition: TopicPartition, item: T) {
        if let Some(&index) = self.open.get(&partition) {
            let batch = &mut self.batches[index].1;
            if batch.len() < self.max_batch_size {
                batch.push(item);
                return;
            }
            trace!(partition = %partition, "Batch full, starting a new one");
        }

        self.open.insert(partition.clone(), self.batches.len());
        self.batches.push((partition, vec![item]));
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of items across all batches.
    pub fn len(&self) -> usize {
        self.batches.iter().map(|(_, items)| items.len()).sum()
    }

    /// Distinct partitions, in order of first appearance.
    pub fn partitions(&self) -> Vec<TopicPartition> {
        let mut seen = HashSet::new();
        self.batches
            .iter()
            .filter(|(partition, _)| seen.insert(partition.clone()))
            .map(|(partition, _)| partition.clone())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<(TopicPartition, Vec<T>)> {
        self.open.clear();
        std::mem::take(&mut self.batches)
    }
}
