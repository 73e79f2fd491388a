//! Producer Session
//!
//! A [`ProducerSession`] drives one transactional producer identity through
//! its lifecycle:
//!
//! ```text
//! builder().build() ──► Uninitialized
//!                          │ initialize()            (broker assigns / bumps epoch)
//!                          │ resume(pid, epoch)      (adopt an in-flight transaction)
//!                          ▼
//!                        Ready ◄──────────────────────────────┐
//!                          │ begin_transaction()              │
//!                          ▼                                  │
//!                      InTransaction ── send / flush          │
//!                          │ commit_transaction()  → Committing ─┤
//!                          │ abort_transaction()   → Aborting  ──┘
//!
//! close(timeout): every state ──► Closed
//! ```
//!
//! ## Ownership
//!
//! Transaction control (`initialize`, `resume`, `begin`, `commit`, `abort`,
//! `close`) takes `&mut self`, so only one caller can drive the state machine
//! at a time. `send`, `flush`, `partitions_for` and the identity accessors take
//! `&self` and may run concurrently inside a transaction.
//!
//! ## Resuming
//!
//! A session that crashed mid-transaction can be replaced by a new one that
//! adopts its `(producer_id, epoch)` with [`ProducerSession::resume`] and then
//! commits or aborts. The broker validates the identity on the first request:
//! if a newer epoch exists, the resumed session is fenced. Committing the same
//! transaction twice, from the original and the resumed session, is harmless:
//! the second commit is a no-op.
//!
//! ## Example
//!
//! ```ignore
//! let mut session = ProducerSession::builder()
//!     .transactional_id("orders-sink-0")
//!     .transport(transport)
//!     .build()?;
//!
//! session.initialize().await?;
//! session.begin_transaction().await?;
//! let ack = session.send(ProducerRecord::new("orders", "payload").with_key("42")).await?;
//! session.commit_transaction().await?;
//! let metadata = ack.await?;
//!
//! session.close(Duration::from_secs(5)).await;
//! ```

use crate::config::SessionConfig;
use crate::delivery::{
    with_request_timeout, Completion, DeliveryCallback, DeliveryFuture, DeliveryResult,
    DeliveryShared, DeliveryWorker, PendingRecord, WorkerMessage,
};
use crate::error::{DeliveryError, Result, SessionError};
use crate::record::ProducerRecord;
use crate::recovery::ResumeToken;
use crate::state::SessionState;
use crate::stats::SessionStats;
use handoff_core::{
    BrokerError, IsolationLevel, PartitionInfo, ProduceRecord, ProducerIdentity, TopicPartition,
    TransactionResult, Transport,
};
use siphasher::sip::SipHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct WorkerHandle {
    sender: mpsc::Sender<WorkerMessage>,
    join: JoinHandle<()>,
}

/// Transactional producer bound to one transactional id.
pub struct ProducerSession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    state: SessionState,
    identity: Option<ProducerIdentity>,
    /// The identity was adopted via `resume`; the coordinator may hold an
    /// open transaction this session did not start.
    inherited_txn: bool,
    worker: Option<WorkerHandle>,
    shared: Arc<DeliveryShared>,
    round_robin: AtomicUsize,
}

impl ProducerSession {
    pub fn builder() -> ProducerSessionBuilder {
        ProducerSessionBuilder::new()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transactional_id(&self) -> &str {
        &self.config.transactional_id
    }

    /// Isolation level readers paired with this session should use.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.config.isolation_level
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }

    /// Acquire a producer identity from the broker.
    ///
    /// The broker bumps the epoch for this transactional id, fencing any older
    /// instance and aborting a transaction it left open. Not retried here.
    pub async fn initialize(&mut self) -> Result<()> {
        self.ensure_state("initialize", &[SessionState::Uninitialized])?;

        let identity = with_request_timeout(
            self.config.request_timeout,
            self.transport.init_producer_id(
                &self.config.transactional_id,
                self.config.transaction_timeout,
            ),
        )
        .await
        .map_err(|e| {
            warn!(
                transactional_id = %self.config.transactional_id,
                error = %e,
                "Failed to initialize producer id"
            );
            SessionError::from_broker(e, &self.config.transactional_id, None)
        })?;

        self.acquire(identity, false);
        info!(
            transactional_id = %self.config.transactional_id,
            producer_id = identity.producer_id,
            epoch = identity.epoch,
            "Producer session initialized"
        );
        Ok(())
    }

    /// Adopt an identity persisted by an earlier session, without contacting
    /// the broker.
    ///
    /// The session is marked as holding a possibly-open transaction, so a
    /// subsequent `commit_transaction` or `abort_transaction` is sent to the
    /// broker even from `Ready`.
    pub async fn resume(&mut self, producer_id: i64, epoch: i16) -> Result<()> {
        self.ensure_state("resume", &[SessionState::Uninitialized])?;

        if producer_id < 0 || epoch < 0 {
            return Err(SessionError::Config(format!(
                "cannot resume invalid producer identity {}@{}",
                producer_id, epoch
            )));
        }

        let identity = ProducerIdentity::new(producer_id, epoch);
        self.acquire(identity, true);
        info!(
            transactional_id = %self.config.transactional_id,
            producer_id,
            epoch,
            "Producer session resumed"
        );
        Ok(())
    }

    /// Resume from a token captured with [`ProducerSession::resume_token`].
    pub async fn resume_from(&mut self, token: &ResumeToken) -> Result<()> {
        self.ensure_state("resume", &[SessionState::Uninitialized])?;

        if token.transactional_id != self.config.transactional_id {
            return Err(SessionError::Config(format!(
                "resume token belongs to transactional id '{}', session is configured for '{}'",
                token.transactional_id, self.config.transactional_id
            )));
        }
        self.resume(token.producer_id, token.epoch).await
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_state("begin_transaction", &[SessionState::Ready])?;

        if let Some(err) = self.shared.fatal_error().await {
            return Err(err.into_session_error());
        }

        self.shared.reset_transaction();
        self.worker_handle()?
            .sender
            .send(WorkerMessage::NewTransaction)
            .await
            .map_err(|_| SessionError::Internal("delivery worker stopped".to_string()))?;

        self.state = SessionState::InTransaction;
        debug!(
            transactional_id = %self.config.transactional_id,
            "Transaction begun"
        );
        Ok(())
    }

    /// Submit a record for delivery within the current transaction.
    ///
    /// Returns as soon as the record is queued. Every delivery failure,
    /// including fencing, is reported through the returned future; only an
    /// illegal state fails here.
    pub async fn send(&self, record: ProducerRecord) -> Result<DeliveryFuture> {
        self.ensure_state("send", &[SessionState::InTransaction])?;

        let (sender, receiver) = oneshot::channel();
        self.enqueue(record, Completion::Channel(sender)).await?;
        Ok(DeliveryFuture::new(receiver))
    }

    /// Like [`send`](Self::send), but invokes `callback` exactly once on the
    /// delivery worker instead of returning a future.
    pub async fn send_with_callback<F>(&self, record: ProducerRecord, callback: F) -> Result<()>
    where
        F: FnOnce(DeliveryResult) + Send + 'static,
    {
        self.ensure_state("send", &[SessionState::InTransaction])?;

        let callback: DeliveryCallback = Box::new(callback);
        self.enqueue(record, Completion::Callback(callback)).await
    }

    /// Wait until every record sent so far has completed.
    ///
    /// Fails with `SessionError::Internal` if the delivery worker stopped
    /// before reaching the flush, since earlier completions may not have fired.
    pub async fn flush(&self) -> Result<()> {
        if self.state.is_closed() {
            return Err(SessionError::illegal_state("flush", self.state));
        }
        self.flush_worker().await
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        self.end_transaction(TransactionResult::Commit).await
    }

    pub async fn abort_transaction(&mut self) -> Result<()> {
        self.end_transaction(TransactionResult::Abort).await
    }

    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<PartitionInfo>> {
        if self.state.is_closed() {
            return Err(SessionError::illegal_state("partitions_for", self.state));
        }
        self.fetch_partitions(topic).await.map_err(|e| {
            SessionError::from_broker(e, &self.config.transactional_id, self.identity)
        })
    }

    pub fn producer_id(&self) -> Result<i64> {
        self.current_identity("producer_id").map(|id| id.producer_id)
    }

    pub fn epoch(&self) -> Result<i16> {
        self.current_identity("epoch").map(|id| id.epoch)
    }

    pub fn identity(&self) -> Result<ProducerIdentity> {
        self.current_identity("identity")
    }

    /// Everything a later session needs to `resume_from` this one.
    pub fn resume_token(&self) -> Result<ResumeToken> {
        let identity = self.current_identity("resume_token")?;
        Ok(ResumeToken::new(
            self.config.transactional_id.clone(),
            identity,
        ))
    }

    /// Close the session, waiting up to `timeout` for queued records.
    ///
    /// Records still unacknowledged when the timeout expires are abandoned:
    /// their futures resolve to `DeliveryError::Abandoned` and callbacks are
    /// not invoked. The transaction itself is left to the coordinator. Calling
    /// `close` again has no effect.
    pub async fn close(&mut self, timeout: Duration) {
        if self.state.is_closed() {
            return;
        }
        let previous = self.state;
        self.state = SessionState::Closed;

        if let Some(WorkerHandle { sender, mut join }) = self.worker.take() {
            drop(sender);
            if tokio::time::timeout(timeout, &mut join).await.is_err() {
                warn!(
                    transactional_id = %self.config.transactional_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Close timed out, abandoning undelivered records"
                );
                join.abort();
            }
        }

        self.transport.close().await;
        info!(
            transactional_id = %self.config.transactional_id,
            previous_state = %previous,
            "Producer session closed"
        );
    }

    /// Close using the configured `close_timeout`.
    pub async fn shutdown(&mut self) {
        let timeout = self.config.close_timeout;
        self.close(timeout).await;
    }

    async fn end_transaction(&mut self, result: TransactionResult) -> Result<()> {
        let operation = match result {
            TransactionResult::Commit => "commit_transaction",
            TransactionResult::Abort => "abort_transaction",
        };
        let ending = match result {
            TransactionResult::Commit => SessionState::Committing,
            TransactionResult::Abort => SessionState::Aborting,
        };

        match self.state {
            SessionState::Uninitialized | SessionState::Closed => {
                Err(SessionError::illegal_state(operation, self.state))
            }
            SessionState::Ready => {
                if !self.inherited_txn {
                    debug!(
                        transactional_id = %self.config.transactional_id,
                        operation,
                        "No transaction in progress, nothing to do"
                    );
                    return Ok(());
                }
                self.state = ending;
                if let Err(e) = self.send_end_txn(result).await {
                    self.state = SessionState::Ready;
                    return Err(e);
                }
                self.finish_transaction(result);
                Ok(())
            }
            SessionState::InTransaction | SessionState::Committing | SessionState::Aborting => {
                self.flush_worker().await?;

                if let Some(err) = self.shared.fatal_error().await {
                    if result == TransactionResult::Commit {
                        self.state = SessionState::InTransaction;
                        return Err(err.into_session_error());
                    }
                    // Fenced: the coordinator already aborted on our behalf
                    debug!(
                        transactional_id = %self.config.transactional_id,
                        "Aborting locally after fencing"
                    );
                    self.finish_transaction(result);
                    return Ok(());
                }

                self.state = ending;
                if self.inherited_txn || self.shared.txn_started() {
                    if let Err(e) = self.send_end_txn(result).await {
                        self.state = SessionState::InTransaction;
                        return Err(e);
                    }
                } else {
                    debug!(
                        transactional_id = %self.config.transactional_id,
                        %result,
                        "Transaction wrote nothing, completing locally"
                    );
                }
                self.finish_transaction(result);
                Ok(())
            }
        }
    }

    async fn send_end_txn(&self, result: TransactionResult) -> Result<()> {
        let identity = self.current_identity("end_transaction")?;

        let response = with_request_timeout(
            self.config.request_timeout,
            self.transport
                .end_txn(&self.config.transactional_id, identity, result),
        )
        .await;

        match response {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    transactional_id = %self.config.transactional_id,
                    producer_id = identity.producer_id,
                    epoch = identity.epoch,
                    %result,
                    error = %e,
                    "Failed to end transaction"
                );
                if matches!(e, BrokerError::ProducerFenced { .. }) {
                    self.shared
                        .set_fatal(DeliveryError::from_broker(
                            e.clone(),
                            &self.config.transactional_id,
                            identity,
                        ))
                        .await;
                }
                Err(SessionError::from_broker(
                    e,
                    &self.config.transactional_id,
                    Some(identity),
                ))
            }
        }
    }

    fn finish_transaction(&mut self, result: TransactionResult) {
        self.state = SessionState::Ready;
        self.inherited_txn = false;
        self.shared.reset_transaction();
        match result {
            TransactionResult::Commit => self.shared.stats.transaction_committed(),
            TransactionResult::Abort => self.shared.stats.transaction_aborted(),
        }
        info!(
            transactional_id = %self.config.transactional_id,
            %result,
            "Transaction completed"
        );
    }

    fn acquire(&mut self, identity: ProducerIdentity, inherited: bool) {
        let (sender, receiver) = mpsc::channel(self.config.delivery_queue_capacity);
        let worker = DeliveryWorker::new(
            self.transport.clone(),
            self.config.transactional_id.clone(),
            identity,
            self.config.max_batch_size,
            self.config.request_timeout,
            receiver,
            self.shared.clone(),
        );
        let join = tokio::spawn(worker.run());

        self.worker = Some(WorkerHandle { sender, join });
        self.identity = Some(identity);
        self.inherited_txn = inherited;
        self.state = SessionState::Ready;
    }

    async fn enqueue(&self, record: ProducerRecord, completion: Completion) -> Result<()> {
        let worker = self.worker_handle()?;
        let partition = self.route(&record).await;
        let timestamp = record
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let pending = PendingRecord {
            partition,
            record: ProduceRecord::new(record.key, record.value, timestamp),
            completion,
        };

        self.shared.stats.record_sent();
        if let Err(mpsc::error::SendError(message)) =
            worker.sender.send(WorkerMessage::Send(pending)).await
        {
            if let WorkerMessage::Send(pending) = message {
                self.shared.stats.record_failed(1);
                pending.completion.complete(Err(DeliveryError::Abandoned));
            }
        }
        Ok(())
    }

    async fn flush_worker(&self) -> Result<()> {
        let Some(worker) = self.worker.as_ref() else {
            return Ok(());
        };
        let (done, wait) = oneshot::channel();
        let reached = match worker.sender.send(WorkerMessage::Flush(done)).await {
            Ok(()) => wait.await.is_ok(),
            Err(_) => false,
        };
        if !reached {
            error!(
                transactional_id = %self.config.transactional_id,
                "Delivery worker stopped before flush completed"
            );
            return Err(SessionError::Internal("delivery worker stopped".to_string()));
        }
        Ok(())
    }

    /// Choose the destination partition for a record.
    async fn route(&self, record: &ProducerRecord) -> std::result::Result<TopicPartition, DeliveryError> {
        let partitions = self
            .cached_partitions(&record.topic)
            .await
            .map_err(|e| match self.identity {
                Some(identity) => {
                    DeliveryError::from_broker(e, &self.config.transactional_id, identity)
                }
                None => DeliveryError::Transport(e),
            })?;

        let count = partitions.len();
        if count == 0 {
            return Err(DeliveryError::UnknownTopicOrPartition {
                topic: record.topic.clone(),
                partition: record.partition.unwrap_or(-1),
            });
        }

        let partition = match (record.partition, &record.key) {
            (Some(partition), _) => {
                if partition < 0 || partition as usize >= count {
                    // The topic may have grown since it was cached
                    self.shared.invalidate_topic(&record.topic).await;
                    return Err(DeliveryError::UnknownTopicOrPartition {
                        topic: record.topic.clone(),
                        partition,
                    });
                }
                partition
            }
            (None, Some(key)) => partition_for_key(key, count),
            (None, None) => (self.round_robin.fetch_add(1, Ordering::Relaxed) % count) as i32,
        };

        Ok(TopicPartition::new(record.topic.clone(), partition))
    }

    async fn cached_partitions(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<PartitionInfo>, BrokerError> {
        if let Some(partitions) = self.shared.cached_partitions(topic).await {
            return Ok(partitions);
        }
        self.fetch_partitions(topic).await
    }

    async fn fetch_partitions(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<PartitionInfo>, BrokerError> {
        let partitions = with_request_timeout(
            self.config.request_timeout,
            self.transport.partitions_for(topic),
        )
        .await?;
        debug!(topic, count = partitions.len(), "Refreshed topic metadata");
        self.shared
            .store_partitions(topic, partitions.clone())
            .await;
        Ok(partitions)
    }

    fn current_identity(&self, operation: &'static str) -> Result<ProducerIdentity> {
        if !self.state.has_identity() {
            return Err(SessionError::illegal_state(operation, self.state));
        }
        self.identity
            .ok_or_else(|| SessionError::illegal_state(operation, self.state))
    }

    fn worker_handle(&self) -> Result<&WorkerHandle> {
        self.worker
            .as_ref()
            .ok_or_else(|| SessionError::Internal("delivery worker not running".to_string()))
    }

    fn ensure_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::illegal_state(operation, self.state))
        }
    }
}

/// Hash-based partition for a keyed record.
fn partition_for_key(key: &[u8], partition_count: usize) -> i32 {
    let mut hasher = SipHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partition_count as u64) as i32
}

/// Builder for [`ProducerSession`].
///
/// ## Defaults
///
/// See [`SessionConfig`]. A transactional id and a transport are required.
///
/// ## Example
///
/// ```ignore
/// let session = ProducerSession::builder()
///     .transactional_id("orders-sink-0")
///     .transport(InMemoryTransport::new(broker))
///     .transaction_timeout(Duration::from_secs(900))
///     .max_batch_size(500)
///     .build()?;
/// ```
pub struct ProducerSessionBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ProducerSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            transport: None,
        }
    }

    /// Replace the whole configuration. Later setters still apply on top.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transactional_id(mut self, transactional_id: impl Into<String>) -> Self {
        self.config.transactional_id = transactional_id.into();
        self
    }

    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a transport that is also referenced elsewhere.
    ///
    /// Closing the session closes this transport for every holder.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn bootstrap_servers(mut self, servers: Vec<String>) -> Self {
        self.config.bootstrap_servers = servers;
        self
    }

    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.config.transaction_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    pub fn delivery_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.delivery_queue_capacity = capacity;
        self
    }

    pub fn isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.config.isolation_level = isolation_level;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Validate the configuration and create an uninitialized session.
    pub fn build(self) -> Result<ProducerSession> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| SessionError::Config("transport is required".to_string()))?;

        Ok(ProducerSession {
            config: self.config,
            transport,
            state: SessionState::Uninitialized,
            identity: None,
            inherited_txn: false,
            worker: None,
            shared: Arc::new(DeliveryShared::default()),
            round_robin: AtomicUsize::new(0),
        })
    }
}

impl Default for ProducerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
