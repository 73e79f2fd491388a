//! Session statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for a producer session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Records accepted by `send` / `send_with_callback`.
    pub records_sent: u64,
    pub records_acknowledged: u64,
    pub records_failed: u64,
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    records_sent: AtomicU64,
    records_acknowledged: AtomicU64,
    records_failed: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_sent(&self) {
        self.records_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acknowledged(&self, count: u64) {
        self.records_acknowledged.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, count: u64) {
        self.records_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn transaction_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        SessionStats {
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_acknowledged: self.records_acknowledged.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
        }
    }
}
