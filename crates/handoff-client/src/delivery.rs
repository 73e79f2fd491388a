//! Delivery Worker
//!
//! Every producer session owns one background task that performs all record
//! I/O. `send` only enqueues; the worker registers partitions with the
//! transaction, produces batches and signals each record's completion.
//!
//! ## Message Flow
//!
//! ```text
//! send ──► WorkerMessage::Send ──┐
//! flush ─► WorkerMessage::Flush ─┼──► bounded mpsc (FIFO) ──► DeliveryWorker
//! begin ─► NewTransaction ───────┘                              │
//!                                                               ├─ add_partitions_to_txn (new partitions)
//!                                                               ├─ produce (one call per batch)
//!                                                               └─ complete each PendingRecord
//! ```
//!
//! `Flush` and `NewTransaction` are barriers: every send queued before them is
//! completed before they are handled, so `flush()` returning means all prior
//! completions have fired.
//!
//! ## Completions
//!
//! A completion fires exactly once, from the worker task. When the session is
//! closed before a record is acknowledged, the worker is stopped and the
//! completion is dropped: a `DeliveryFuture` then resolves to
//! `DeliveryError::Abandoned` and a callback is never invoked.
//!
//! A callback that panics is contained: the panic is logged and the worker
//! goes on completing the rest of the batch.
//!
//! ## Fencing
//!
//! A fencing rejection is recorded in the shared state. Records queued after
//! that point fail immediately with the same error, and the session refuses to
//! begin or commit further transactions.

use crate::batch::BatchAccumulator;
use crate::error::DeliveryError;
use crate::record::RecordMetadata;
use crate::stats::StatsCounters;
use handoff_core::{
    BrokerError, BrokerResult, PartitionInfo, ProduceRecord, ProducerIdentity, TopicPartition,
    Transport,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, warn};

/// Upper bound on batches assembled from one drain of the queue.
const MAX_BATCHES_PER_ROUND: usize = 16;

/// Outcome of a single send.
pub type DeliveryResult = std::result::Result<RecordMetadata, DeliveryError>;

/// Callback form of a send completion. Runs on the delivery worker and must not block.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// Resolves once the record is acknowledged or definitively fails.
///
/// Dropping the future does not cancel the send.
#[derive(Debug)]
pub struct DeliveryFuture {
    receiver: oneshot::Receiver<DeliveryResult>,
}

impl DeliveryFuture {
    pub(crate) fn new(receiver: oneshot::Receiver<DeliveryResult>) -> Self {
        Self { receiver }
    }
}

impl Future for DeliveryFuture {
    type Output = DeliveryResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DeliveryError::Abandoned)))
    }
}

pub(crate) enum Completion {
    Channel(oneshot::Sender<DeliveryResult>),
    Callback(DeliveryCallback),
}

impl Completion {
    pub(crate) fn complete(self, result: DeliveryResult) {
        match self {
            Completion::Channel(sender) => {
                // Receiver may have been dropped; the send still happened
                let _ = sender.send(result);
            }
            Completion::Callback(callback) => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(move || callback(result))) {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(panic = %message, "Delivery callback panicked");
                }
            }
        }
    }
}

/// A record handed to the worker together with its completion.
///
/// `partition` is an error when routing failed in `send`; the failure is
/// still reported through the worker so completions keep queue order.
pub(crate) struct PendingRecord {
    pub partition: Result<TopicPartition, DeliveryError>,
    pub record: ProduceRecord,
    pub completion: Completion,
}

pub(crate) enum WorkerMessage {
    Send(PendingRecord),
    Flush(oneshot::Sender<()>),
    /// Forget registered partitions; the next write starts a new transaction.
    NewTransaction,
}

/// State shared between the session and its worker.
#[derive(Default)]
pub(crate) struct DeliveryShared {
    fatal: Mutex<Option<DeliveryError>>,
    /// Set once a partition registration was attempted in the current
    /// transaction, so the coordinator may hold an open transaction.
    txn_started: AtomicBool,
    /// Partition metadata per topic, filled on first use.
    topics: RwLock<HashMap<String, Vec<PartitionInfo>>>,
    pub stats: StatsCounters,
}

impl DeliveryShared {
    pub(crate) async fn fatal_error(&self) -> Option<DeliveryError> {
        self.fatal.lock().await.clone()
    }

    pub(crate) async fn set_fatal(&self, err: DeliveryError) {
        let mut fatal = self.fatal.lock().await;
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    pub(crate) fn txn_started(&self) -> bool {
        self.txn_started.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_transaction(&self) {
        self.txn_started.store(false, Ordering::SeqCst);
    }

    pub(crate) async fn cached_partitions(&self, topic: &str) -> Option<Vec<PartitionInfo>> {
        self.topics.read().await.get(topic).cloned()
    }

    pub(crate) async fn store_partitions(&self, topic: &str, partitions: Vec<PartitionInfo>) {
        self.topics.write().await.insert(topic.to_string(), partitions);
    }

    /// Forget cached metadata so the next send to `topic` refetches it.
    pub(crate) async fn invalidate_topic(&self, topic: &str) {
        if self.topics.write().await.remove(topic).is_some() {
            debug!(topic, "Invalidated cached topic metadata");
        }
    }
}

/// Run a broker request bounded by `timeout`.
pub(crate) async fn with_request_timeout<T>(
    timeout: Duration,
    request: impl Future<Output = BrokerResult<T>>,
) -> BrokerResult<T> {
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::RequestTimedOut(timeout)),
    }
}

pub(crate) struct DeliveryWorker {
    transport: Arc<dyn Transport>,
    transactional_id: String,
    identity: ProducerIdentity,
    max_batch_size: usize,
    request_timeout: Duration,
    receiver: mpsc::Receiver<WorkerMessage>,
    shared: Arc<DeliveryShared>,
    registered: HashSet<TopicPartition>,
}

impl DeliveryWorker {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        transactional_id: String,
        identity: ProducerIdentity,
        max_batch_size: usize,
        request_timeout: Duration,
        receiver: mpsc::Receiver<WorkerMessage>,
        shared: Arc<DeliveryShared>,
    ) -> Self {
        Self {
            transport,
            transactional_id,
            identity,
            max_batch_size,
            request_timeout,
            receiver,
            shared,
            registered: HashSet::new(),
        }
    }

    /// Process messages until every sender is dropped.
    pub(crate) async fn run(mut self) {
        debug!(
            transactional_id = %self.transactional_id,
            producer_id = self.identity.producer_id,
            epoch = self.identity.epoch,
            "Delivery worker started"
        );

        let round_limit = self.max_batch_size.saturating_mul(MAX_BATCHES_PER_ROUND);

        while let Some(first) = self.receiver.recv().await {
            let mut pending = Vec::new();
            let mut barrier = None;
            let mut next = Some(first);

            while let Some(message) = next.take() {
                match message {
                    WorkerMessage::Send(record) => {
                        pending.push(record);
                        if pending.len() < round_limit {
                            next = self.receiver.try_recv().ok();
                        }
                    }
                    other => barrier = Some(other),
                }
            }

            if !pending.is_empty() {
                self.deliver(pending).await;
            }

            match barrier {
                Some(WorkerMessage::Flush(done)) => {
                    let _ = done.send(());
                }
                Some(WorkerMessage::NewTransaction) => {
                    self.registered.clear();
                }
                Some(WorkerMessage::Send(_)) | None => {}
            }
        }

        debug!(
            transactional_id = %self.transactional_id,
            "Delivery worker stopped"
        );
    }

    async fn deliver(&mut self, pending: Vec<PendingRecord>) {
        if let Some(err) = self.shared.fatal_error().await {
            self.fail_all(pending.into_iter().map(|p| p.completion), &err);
            return;
        }

        let mut batches = BatchAccumulator::new(self.max_batch_size);
        for PendingRecord {
            partition,
            record,
            completion,
        } in pending
        {
            match partition {
                Ok(partition) => batches.push(partition, (record, completion)),
                Err(err) => {
                    self.shared.stats.record_failed(1);
                    completion.complete(Err(err));
                }
            }
        }

        if batches.is_empty() {
            return;
        }

        let new_partitions: Vec<TopicPartition> = batches
            .partitions()
            .into_iter()
            .filter(|partition| !self.registered.contains(partition))
            .collect();

        if !new_partitions.is_empty() {
            self.shared.txn_started.store(true, Ordering::SeqCst);
            let result = with_request_timeout(
                self.request_timeout,
                self.transport.add_partitions_to_txn(
                    &self.transactional_id,
                    self.identity,
                    &new_partitions,
                ),
            )
            .await;

            match result {
                Ok(()) => {
                    debug!(
                        transactional_id = %self.transactional_id,
                        count = new_partitions.len(),
                        "Registered partitions with transaction"
                    );
                    self.registered.extend(new_partitions);
                }
                Err(e) => {
                    warn!(
                        transactional_id = %self.transactional_id,
                        error = %e,
                        "Failed to register partitions with transaction"
                    );
                    let err = self.delivery_error(e).await;
                    let completions = batches
                        .drain()
                        .into_iter()
                        .flat_map(|(_, items)| items.into_iter().map(|(_, completion)| completion));
                    self.fail_all(completions, &err);
                    return;
                }
            }
        }

        for (partition, items) in batches.drain() {
            self.produce_batch(partition, items).await;
        }
    }

    async fn produce_batch(
        &mut self,
        partition: TopicPartition,
        items: Vec<(ProduceRecord, Completion)>,
    ) {
        // A fencing error from an earlier batch in this round applies here too
        if let Some(err) = self.shared.fatal_error().await {
            self.fail_all(items.into_iter().map(|(_, completion)| completion), &err);
            return;
        }

        let (records, completions): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        let timestamps: Vec<i64> = records.iter().map(|r| r.timestamp).collect();
        let count = records.len();

        let result = with_request_timeout(
            self.request_timeout,
            self.transport
                .produce(&self.transactional_id, self.identity, &partition, records),
        )
        .await;

        match result {
            Ok(base_offset) => {
                self.shared.stats.record_acknowledged(count as u64);
                for (index, (completion, timestamp)) in
                    completions.into_iter().zip(timestamps).enumerate()
                {
                    completion.complete(Ok(RecordMetadata {
                        topic: partition.topic.clone(),
                        partition: partition.partition,
                        offset: base_offset + index as u64,
                        timestamp,
                    }));
                }
            }
            Err(e) => {
                error!(
                    transactional_id = %self.transactional_id,
                    partition = %partition,
                    count,
                    error = %e,
                    "Failed to produce batch"
                );
                let err = self.delivery_error(e).await;
                self.fail_all(completions.into_iter(), &err);
            }
        }
    }

    /// Map a broker failure and record it if it ends the session's progress.
    async fn delivery_error(&self, err: BrokerError) -> DeliveryError {
        if let BrokerError::UnknownTopicOrPartition { topic, .. } = &err {
            self.shared.invalidate_topic(topic).await;
        }
        let err = DeliveryError::from_broker(err, &self.transactional_id, self.identity);
        if err.is_terminal() {
            warn!(
                transactional_id = %self.transactional_id,
                producer_id = self.identity.producer_id,
                epoch = self.identity.epoch,
                error = %err,
                "Producer can no longer write; failing further sends"
            );
            self.shared.set_fatal(err.clone()).await;
        }
        err
    }

    fn fail_all(&self, completions: impl Iterator<Item = Completion>, err: &DeliveryError) {
        let mut failed = 0;
        for completion in completions {
            completion.complete(Err(err.clone()));
            failed += 1;
        }
        self.shared.stats.record_failed(failed);
    }
}
