//! Transaction Coordinator
//!
//! Tracks one [`TransactionMetadata`] per transactional id and enforces the
//! producer fencing contract:
//!
//! - Every transactional id has exactly one current `(producer_id, epoch)`.
//! - `init_producer_id` bumps the epoch. Any transaction the previous epoch
//!   left open is aborted and its partitions are handed back so the broker
//!   can write abort markers.
//! - Requests carrying an older epoch are fenced. Requests carrying an epoch
//!   the coordinator never issued are rejected as invalid.
//!
//! ## Transaction States
//!
//! ```text
//!            add_partitions              end_txn(commit)
//!   Empty ─────────────────► Ongoing ─────────────────► CompleteCommit
//!     ▲                        │                              │
//!     │                        │ end_txn(abort) / expiry      │ add_partitions
//!     │                        ▼                              ▼
//!     └──── epoch bump ── CompleteAbort ──── add_partitions ─► Ongoing
//! ```
//!
//! ## Idempotent Completion
//!
//! Ending a transaction is safe to repeat. At the current epoch, an end request
//! with no transaction in flight, or one matching the outcome already recorded,
//! succeeds without effect. At a superseded epoch, the request succeeds only if
//! it agrees with what that epoch's last transaction actually became; a stale
//! commit of a transaction that was aborted is fenced. Stale requests never
//! modify the current epoch's transaction.
//!
//! The coordinator is synchronous. The broker serializes access to it together
//! with the partition logs so coordinator decisions and marker writes are atomic.

use handoff_core::{BrokerError, BrokerResult, ProducerIdentity, TopicPartition, TransactionResult};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const FIRST_PRODUCER_ID: i64 = 1000;

/// Coordinator-side state of a transactional id's current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// No transaction has started at the current epoch.
    Empty,
    /// Partitions are registered and writes are accepted.
    Ongoing,
    CompleteCommit,
    CompleteAbort,
}

impl std::fmt::Display for TxnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxnState::Empty => write!(f, "empty"),
            TxnState::Ongoing => write!(f, "ongoing"),
            TxnState::CompleteCommit => write!(f, "complete_commit"),
            TxnState::CompleteAbort => write!(f, "complete_abort"),
        }
    }
}

impl TxnState {
    fn completed(result: TransactionResult) -> Self {
        match result {
            TransactionResult::Commit => TxnState::CompleteCommit,
            TransactionResult::Abort => TxnState::CompleteAbort,
        }
    }
}

/// Everything the coordinator knows about one transactional id.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    pub transactional_id: String,
    pub producer_id: i64,
    pub epoch: i16,
    pub state: TxnState,
    pub partitions: BTreeSet<TopicPartition>,
    pub started_at: Option<Instant>,
    pub timeout: Duration,
    /// Outcome of the last transaction completed under each epoch.
    pub outcomes_by_epoch: HashMap<i16, TransactionResult>,
}

impl TransactionMetadata {
    pub fn identity(&self) -> ProducerIdentity {
        ProducerIdentity::new(self.producer_id, self.epoch)
    }

    /// Check if the ongoing transaction has exceeded its timeout.
    pub fn is_expired(&self) -> bool {
        self.state == TxnState::Ongoing
            && self
                .started_at
                .map(|started| started.elapsed() > self.timeout)
                .unwrap_or(false)
    }

    fn validate(&self, identity: ProducerIdentity) -> BrokerResult<()> {
        if identity.producer_id != self.producer_id {
            return Err(BrokerError::InvalidProducerIdMapping {
                transactional_id: self.transactional_id.clone(),
                producer_id: identity.producer_id,
            });
        }
        if identity.epoch < self.epoch {
            return Err(BrokerError::ProducerFenced {
                transactional_id: self.transactional_id.clone(),
                epoch: identity.epoch,
                current_epoch: self.epoch,
            });
        }
        if identity.epoch > self.epoch {
            return Err(BrokerError::InvalidProducerEpoch {
                transactional_id: self.transactional_id.clone(),
                epoch: identity.epoch,
            });
        }
        Ok(())
    }

    /// Complete the ongoing transaction and hand back its partitions.
    fn complete(&mut self, result: TransactionResult) -> Vec<TopicPartition> {
        self.state = TxnState::completed(result);
        self.started_at = None;
        self.outcomes_by_epoch.insert(self.epoch, result);
        std::mem::take(&mut self.partitions).into_iter().collect()
    }

    fn bump_epoch(&mut self, next_producer_id: &mut i64) {
        if self.epoch == i16::MAX {
            // Epoch space exhausted: continue under a fresh producer id.
            self.producer_id = *next_producer_id;
            *next_producer_id += 1;
            self.epoch = 0;
            self.outcomes_by_epoch.clear();
        } else {
            self.epoch += 1;
        }
        self.state = TxnState::Empty;
    }
}

/// Partitions that need transaction markers written, and by whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransaction {
    pub transactional_id: String,
    pub producer_id: i64,
    pub result: TransactionResult,
    pub partitions: Vec<TopicPartition>,
}

/// Result of an `init_producer_id` request.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub identity: ProducerIdentity,
    /// Transaction left open by the previous epoch, now aborted.
    pub aborted: Option<CompletedTransaction>,
}

/// Result of an `end_txn` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndTxnOutcome {
    /// A transaction was completed; markers must be written.
    Completed(CompletedTransaction),
    /// Nothing to do: no transaction in flight or the outcome was already recorded.
    NoOp,
}

/// Summary statistics for the transaction coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub transactional_ids: usize,
    pub ongoing_transactions: usize,
    pub committed_transactions: usize,
    pub aborted_transactions: usize,
    pub expired_transactions: usize,
    pub fenced_requests: usize,
}

pub struct TransactionCoordinator {
    transactions: HashMap<String, TransactionMetadata>,
    next_producer_id: i64,
    max_timeout: Duration,
    stats: CoordinatorStats,
}

impl TransactionCoordinator {
    /// Create a coordinator that clamps requested timeouts to `max_timeout`.
    pub fn new(max_timeout: Duration) -> Self {
        Self {
            transactions: HashMap::new(),
            next_producer_id: FIRST_PRODUCER_ID,
            max_timeout,
            stats: CoordinatorStats::default(),
        }
    }

    /// Assign a producer id to a new transactional id, or bump the epoch of a
    /// known one, aborting whatever the previous epoch left open.
    pub fn init_producer_id(&mut self, transactional_id: &str, timeout: Duration) -> InitOutcome {
        let timeout = timeout.min(self.max_timeout);

        let Some(meta) = self.transactions.get_mut(transactional_id) else {
            let producer_id = self.next_producer_id;
            self.next_producer_id += 1;
            let meta = TransactionMetadata {
                transactional_id: transactional_id.to_string(),
                producer_id,
                epoch: 0,
                state: TxnState::Empty,
                partitions: BTreeSet::new(),
                started_at: None,
                timeout,
                outcomes_by_epoch: HashMap::new(),
            };
            let identity = meta.identity();
            self.transactions.insert(transactional_id.to_string(), meta);
            self.stats.transactional_ids += 1;
            info!(
                transactional_id,
                producer_id, "Assigned producer id to new transactional id"
            );
            return InitOutcome {
                identity,
                aborted: None,
            };
        };

        let aborted = if meta.state == TxnState::Ongoing {
            let producer_id = meta.producer_id;
            let partitions = meta.complete(TransactionResult::Abort);
            self.stats.ongoing_transactions -= 1;
            self.stats.aborted_transactions += 1;
            warn!(
                transactional_id,
                producer_id,
                epoch = meta.epoch,
                partitions = partitions.len(),
                "Aborting transaction left open by previous producer instance"
            );
            Some(CompletedTransaction {
                transactional_id: transactional_id.to_string(),
                producer_id,
                result: TransactionResult::Abort,
                partitions,
            })
        } else {
            None
        };

        meta.bump_epoch(&mut self.next_producer_id);
        meta.timeout = timeout;
        info!(
            transactional_id,
            producer_id = meta.producer_id,
            epoch = meta.epoch,
            "Bumped producer epoch"
        );

        InitOutcome {
            identity: meta.identity(),
            aborted,
        }
    }

    /// Register partitions with the transaction, starting one if none is ongoing.
    pub fn add_partitions(
        &mut self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partitions: &[TopicPartition],
    ) -> BrokerResult<()> {
        let meta = self.validated(transactional_id, identity)?;

        let started = if meta.state != TxnState::Ongoing {
            meta.state = TxnState::Ongoing;
            meta.partitions.clear();
            meta.started_at = Some(Instant::now());
            true
        } else {
            false
        };

        for partition in partitions {
            if meta.partitions.insert(partition.clone()) {
                debug!(
                    transactional_id,
                    epoch = identity.epoch,
                    partition = %partition,
                    "Enrolled partition in transaction"
                );
            }
        }

        if started {
            self.stats.ongoing_transactions += 1;
        }
        Ok(())
    }

    /// Check that `identity` may write to `partition` right now.
    pub fn check_produce(
        &mut self,
        transactional_id: &str,
        identity: ProducerIdentity,
        partition: &TopicPartition,
    ) -> BrokerResult<()> {
        let meta = self.validated(transactional_id, identity)?;

        if meta.state != TxnState::Ongoing {
            return Err(BrokerError::InvalidTxnState(format!(
                "produce to {} requires an ongoing transaction, state is {}",
                partition, meta.state
            )));
        }
        if !meta.partitions.contains(partition) {
            return Err(BrokerError::InvalidTxnState(format!(
                "partition {} is not registered with the transaction",
                partition
            )));
        }
        Ok(())
    }

    /// Commit or abort on behalf of `identity`.
    pub fn end_txn(
        &mut self,
        transactional_id: &str,
        identity: ProducerIdentity,
        result: TransactionResult,
    ) -> BrokerResult<EndTxnOutcome> {
        let meta = self.transactions.get_mut(transactional_id).ok_or_else(|| {
            BrokerError::InvalidProducerIdMapping {
                transactional_id: transactional_id.to_string(),
                producer_id: identity.producer_id,
            }
        })?;

        if identity.producer_id == meta.producer_id && identity.epoch < meta.epoch {
            return match meta.outcomes_by_epoch.get(&identity.epoch) {
                None => {
                    debug!(
                        transactional_id,
                        epoch = identity.epoch,
                        %result,
                        "Stale end request with no recorded outcome"
                    );
                    Ok(EndTxnOutcome::NoOp)
                }
                Some(recorded) if *recorded == result => {
                    debug!(
                        transactional_id,
                        epoch = identity.epoch,
                        %result,
                        "Stale end request matches recorded outcome"
                    );
                    Ok(EndTxnOutcome::NoOp)
                }
                Some(recorded) => {
                    warn!(
                        transactional_id,
                        epoch = identity.epoch,
                        current_epoch = meta.epoch,
                        requested = %result,
                        recorded = %recorded,
                        "Fencing stale end request that contradicts recorded outcome"
                    );
                    self.stats.fenced_requests += 1;
                    Err(BrokerError::ProducerFenced {
                        transactional_id: transactional_id.to_string(),
                        epoch: identity.epoch,
                        current_epoch: meta.epoch,
                    })
                }
            };
        }

        let meta = self.validated(transactional_id, identity)?;
        match (meta.state, result) {
            (TxnState::Ongoing, _) => {
                let producer_id = meta.producer_id;
                let partitions = meta.complete(result);
                self.stats.ongoing_transactions -= 1;
                match result {
                    TransactionResult::Commit => self.stats.committed_transactions += 1,
                    TransactionResult::Abort => self.stats.aborted_transactions += 1,
                }
                info!(
                    transactional_id,
                    producer_id,
                    epoch = identity.epoch,
                    %result,
                    partitions = partitions.len(),
                    "Transaction completed"
                );
                Ok(EndTxnOutcome::Completed(CompletedTransaction {
                    transactional_id: transactional_id.to_string(),
                    producer_id,
                    result,
                    partitions,
                }))
            }
            (TxnState::Empty, _)
            | (TxnState::CompleteCommit, TransactionResult::Commit)
            | (TxnState::CompleteAbort, TransactionResult::Abort) => {
                debug!(
                    transactional_id,
                    epoch = identity.epoch,
                    state = %meta.state,
                    %result,
                    "End request has nothing to complete"
                );
                Ok(EndTxnOutcome::NoOp)
            }
            (state, result) => Err(BrokerError::InvalidTxnState(format!(
                "cannot {} transaction in state {}",
                result, state
            ))),
        }
    }

    /// Abort every ongoing transaction that has outlived its timeout.
    ///
    /// The epoch is bumped so the producer that owned the transaction is fenced
    /// on its next request.
    pub fn expire_transactions(&mut self) -> Vec<CompletedTransaction> {
        let mut expired = Vec::new();

        for (transactional_id, meta) in self.transactions.iter_mut() {
            if !meta.is_expired() {
                continue;
            }
            warn!(
                transactional_id = %transactional_id,
                producer_id = meta.producer_id,
                epoch = meta.epoch,
                timeout_ms = meta.timeout.as_millis() as u64,
                "Transaction timed out, aborting"
            );
            let producer_id = meta.producer_id;
            let partitions = meta.complete(TransactionResult::Abort);
            meta.bump_epoch(&mut self.next_producer_id);
            expired.push(CompletedTransaction {
                transactional_id: transactional_id.clone(),
                producer_id,
                result: TransactionResult::Abort,
                partitions,
            });
        }

        self.stats.ongoing_transactions -= expired.len();
        self.stats.aborted_transactions += expired.len();
        self.stats.expired_transactions += expired.len();
        expired
    }

    pub fn describe(&self, transactional_id: &str) -> Option<TransactionMetadata> {
        self.transactions.get(transactional_id).cloned()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.clone()
    }

    fn validated(
        &mut self,
        transactional_id: &str,
        identity: ProducerIdentity,
    ) -> BrokerResult<&mut TransactionMetadata> {
        let meta = self.transactions.get_mut(transactional_id).ok_or_else(|| {
            BrokerError::InvalidProducerIdMapping {
                transactional_id: transactional_id.to_string(),
                producer_id: identity.producer_id,
            }
        })?;

        if let Err(e) = meta.validate(identity) {
            if matches!(e, BrokerError::ProducerFenced { .. }) {
                self.stats.fenced_requests += 1;
                warn!(
                    transactional_id,
                    epoch = identity.epoch,
                    current_epoch = meta.epoch,
                    "Rejected request from fenced producer"
                );
            }
            return Err(e);
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> TransactionCoordinator {
        TransactionCoordinator::new(Duration::from_secs(60))
    }

    fn tp(partition: i32) -> TopicPartition {
        TopicPartition::new("topic-a", partition)
    }

    // Test 1: New transactional id gets epoch 0, re-init bumps the epoch
    #[test]
    fn test_init_assigns_and_bumps() {
        let mut coord = coordinator();

        let first = coord.init_producer_id("tx-1", Duration::from_secs(10));
        assert_eq!(first.identity.epoch, 0);
        assert!(first.aborted.is_none());

        let second = coord.init_producer_id("tx-1", Duration::from_secs(10));
        assert_eq!(second.identity.producer_id, first.identity.producer_id);
        assert_eq!(second.identity.epoch, 1);

        let other = coord.init_producer_id("tx-2", Duration::from_secs(10));
        assert_ne!(other.identity.producer_id, first.identity.producer_id);
    }

    // Test 2: Normal commit flow (add_partitions -> produce check -> commit)
    #[test]
    fn test_normal_commit_flow() {
        let mut coord = coordinator();
        let id = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;

        coord.add_partitions("tx-1", id, &[tp(0), tp(1)]).unwrap();
        coord.check_produce("tx-1", id, &tp(0)).unwrap();

        let outcome = coord.end_txn("tx-1", id, TransactionResult::Commit).unwrap();
        match outcome {
            EndTxnOutcome::Completed(done) => {
                assert_eq!(done.partitions, vec![tp(0), tp(1)]);
                assert_eq!(done.result, TransactionResult::Commit);
            }
            EndTxnOutcome::NoOp => panic!("expected completion"),
        }

        let meta = coord.describe("tx-1").unwrap();
        assert_eq!(meta.state, TxnState::CompleteCommit);
        assert_eq!(coord.stats().committed_transactions, 1);
    }

    // Test 3: Produce to an unregistered partition is an invalid state
    #[test]
    fn test_produce_requires_registration() {
        let mut coord = coordinator();
        let id = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;

        let err = coord.check_produce("tx-1", id, &tp(0)).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidTxnState(_)));

        coord.add_partitions("tx-1", id, &[tp(1)]).unwrap();
        let err = coord.check_produce("tx-1", id, &tp(0)).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidTxnState(_)));
    }

    // Test 4: Re-init aborts the open transaction of the previous epoch
    #[test]
    fn test_reinit_aborts_open_transaction() {
        let mut coord = coordinator();
        let old = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", old, &[tp(0)]).unwrap();

        let outcome = coord.init_producer_id("tx-1", Duration::from_secs(10));
        let aborted = outcome.aborted.expect("open transaction should be aborted");
        assert_eq!(aborted.partitions, vec![tp(0)]);
        assert_eq!(aborted.result, TransactionResult::Abort);

        let meta = coord.describe("tx-1").unwrap();
        assert_eq!(meta.state, TxnState::Empty);
        assert_eq!(meta.outcomes_by_epoch.get(&0), Some(&TransactionResult::Abort));
    }

    // Test 5: Stale epoch writes are fenced, future epochs are invalid
    #[test]
    fn test_epoch_validation() {
        let mut coord = coordinator();
        let old = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        let current = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;

        let err = coord.add_partitions("tx-1", old, &[tp(0)]).unwrap_err();
        assert!(matches!(
            err,
            BrokerError::ProducerFenced {
                epoch: 0,
                current_epoch: 1,
                ..
            }
        ));

        let err = coord
            .add_partitions("tx-1", current.bump(), &[tp(0)])
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidProducerEpoch { .. }));

        let err = coord
            .add_partitions("tx-1", ProducerIdentity::new(1, 1), &[tp(0)])
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidProducerIdMapping { .. }));

        let err = coord
            .add_partitions("unknown", current, &[tp(0)])
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidProducerIdMapping { .. }));

        assert_eq!(coord.stats().fenced_requests, 1);
    }

    // Test 6: Repeated commit at the current epoch is a no-op
    #[test]
    fn test_repeated_commit_is_noop() {
        let mut coord = coordinator();
        let id = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", id, &[tp(0)]).unwrap();
        coord.end_txn("tx-1", id, TransactionResult::Commit).unwrap();

        let again = coord.end_txn("tx-1", id, TransactionResult::Commit).unwrap();
        assert_eq!(again, EndTxnOutcome::NoOp);

        let contradict = coord.end_txn("tx-1", id, TransactionResult::Abort).unwrap_err();
        assert!(matches!(contradict, BrokerError::InvalidTxnState(_)));
    }

    // Test 7: End request with nothing started is a no-op
    #[test]
    fn test_end_without_transaction_is_noop() {
        let mut coord = coordinator();
        let id = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;

        assert_eq!(
            coord.end_txn("tx-1", id, TransactionResult::Commit).unwrap(),
            EndTxnOutcome::NoOp
        );
        assert_eq!(
            coord.end_txn("tx-1", id, TransactionResult::Abort).unwrap(),
            EndTxnOutcome::NoOp
        );
    }

    // Test 8: Stale commit of a transaction aborted by re-init is fenced
    #[test]
    fn test_stale_commit_of_aborted_transaction_is_fenced() {
        let mut coord = coordinator();
        let old = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", old, &[tp(0)]).unwrap();
        let current = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", current, &[tp(1)]).unwrap();

        let err = coord.end_txn("tx-1", old, TransactionResult::Commit).unwrap_err();
        assert!(matches!(err, BrokerError::ProducerFenced { .. }));

        // Stale abort agrees with what happened
        assert_eq!(
            coord.end_txn("tx-1", old, TransactionResult::Abort).unwrap(),
            EndTxnOutcome::NoOp
        );

        // Current transaction untouched
        let meta = coord.describe("tx-1").unwrap();
        assert_eq!(meta.state, TxnState::Ongoing);
        assert!(meta.partitions.contains(&tp(1)));
    }

    // Test 9: Stale commit matching the recorded commit succeeds
    #[test]
    fn test_stale_commit_matching_outcome() {
        let mut coord = coordinator();
        let old = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", old, &[tp(0)]).unwrap();
        coord.end_txn("tx-1", old, TransactionResult::Commit).unwrap();
        coord.init_producer_id("tx-1", Duration::from_secs(10));

        assert_eq!(
            coord.end_txn("tx-1", old, TransactionResult::Commit).unwrap(),
            EndTxnOutcome::NoOp
        );
    }

    // Test 10: A resumed identity at a fresh epoch may abort with nothing open
    #[test]
    fn test_fresh_epoch_abort_after_previous_commit() {
        let mut coord = coordinator();
        let old = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", old, &[tp(0)]).unwrap();
        coord.end_txn("tx-1", old, TransactionResult::Commit).unwrap();
        let current = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;

        assert_eq!(
            coord.end_txn("tx-1", current, TransactionResult::Abort).unwrap(),
            EndTxnOutcome::NoOp
        );
    }

    // Test 11: Timed-out transactions are aborted and their producer fenced
    #[test]
    fn test_expire_transactions() {
        let mut coord = coordinator();
        let id = coord
            .init_producer_id("tx-1", Duration::from_millis(10))
            .identity;
        coord.add_partitions("tx-1", id, &[tp(0)]).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let expired = coord.expire_transactions();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].transactional_id, "tx-1");

        let err = coord.check_produce("tx-1", id, &tp(0)).unwrap_err();
        assert!(matches!(err, BrokerError::ProducerFenced { .. }));

        let err = coord.end_txn("tx-1", id, TransactionResult::Commit).unwrap_err();
        assert!(matches!(err, BrokerError::ProducerFenced { .. }));

        let stats = coord.stats();
        assert_eq!(stats.expired_transactions, 1);
        assert_eq!(stats.ongoing_transactions, 0);
    }

    // Test 12: Requested timeout is clamped
    #[test]
    fn test_timeout_clamped() {
        let mut coord = TransactionCoordinator::new(Duration::from_secs(5));
        coord.init_producer_id("tx-1", Duration::from_secs(600));
        assert_eq!(
            coord.describe("tx-1").unwrap().timeout,
            Duration::from_secs(5)
        );
    }

    // Test 13: Adding the same partition twice is idempotent
    #[test]
    fn test_add_partitions_idempotent() {
        let mut coord = coordinator();
        let id = coord.init_producer_id("tx-1", Duration::from_secs(10)).identity;
        coord.add_partitions("tx-1", id, &[tp(0)]).unwrap();
        coord.add_partitions("tx-1", id, &[tp(0), tp(0)]).unwrap();

        let meta = coord.describe("tx-1").unwrap();
        assert_eq!(meta.partitions.len(), 1);
        assert_eq!(coord.stats().ongoing_transactions, 1);
    }
}
