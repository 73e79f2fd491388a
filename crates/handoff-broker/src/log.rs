//! Partition Log
//!
//! An append-only log per partition. Data entries written inside a transaction
//! carry the producer id; the coordinator later appends a control marker
//! (commit or abort) for that producer to every partition the transaction
//! touched. Markers consume an offset, as in Kafka.
//!
//! ## Visibility
//!
//! - `ReadUncommitted` sees every data entry.
//! - `ReadCommitted` stops at the last stable offset (LSO): the offset of the
//!   first transactional entry whose transaction is still undecided. Below the
//!   LSO it returns non-transactional entries and entries whose transaction
//!   was committed.

use bytes::Bytes;
use handoff_core::{IsolationLevel, ProduceRecord, TransactionResult};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Data {
        offset: u64,
        /// Set when the entry was written inside a transaction.
        producer_id: Option<i64>,
        key: Option<Bytes>,
        value: Bytes,
        timestamp: i64,
    },
    Control {
        offset: u64,
        producer_id: i64,
        result: TransactionResult,
    },
}

impl LogEntry {
    pub fn offset(&self) -> u64 {
        match self {
            LogEntry::Data { offset, .. } | LogEntry::Control { offset, .. } => *offset,
        }
    }
}

/// A data entry visible to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRecord {
    pub offset: u64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct PartitionLog {
    entries: Vec<LogEntry>,
    next_offset: u64,
}

impl PartitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records and return the offset of the first one.
    pub fn append(&mut self, producer_id: Option<i64>, records: Vec<ProduceRecord>) -> u64 {
        let base_offset = self.next_offset;
        for record in records {
            self.entries.push(LogEntry::Data {
                offset: self.next_offset,
                producer_id,
                key: record.key,
                value: record.value,
                timestamp: record.timestamp,
            });
            self.next_offset += 1;
        }
        base_offset
    }

    pub fn append_marker(&mut self, producer_id: i64, result: TransactionResult) -> u64 {
        let offset = self.next_offset;
        self.entries.push(LogEntry::Control {
            offset,
            producer_id,
            result,
        });
        self.next_offset += 1;
        offset
    }

    /// Offset the next appended entry will receive.
    pub fn high_watermark(&self) -> u64 {
        self.next_offset
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// First offset whose transaction is still undecided, or the high
    /// watermark when every transaction is decided.
    pub fn last_stable_offset(&self) -> u64 {
        let fates = self.fates();
        self.entries
            .iter()
            .zip(fates.iter())
            .find_map(|(entry, fate)| match (entry, fate) {
                (LogEntry::Data { producer_id: Some(_), offset, .. }, None) => Some(*offset),
                _ => None,
            })
            .unwrap_or(self.next_offset)
    }

    pub fn read(&self, isolation: IsolationLevel) -> Vec<VisibleRecord> {
        match isolation {
            IsolationLevel::ReadUncommitted => self
                .entries
                .iter()
                .filter_map(Self::visible)
                .collect(),
            IsolationLevel::ReadCommitted => {
                let fates = self.fates();
                let lso = self.last_stable_offset();
                self.entries
                    .iter()
                    .zip(fates)
                    .take_while(|(entry, _)| entry.offset() < lso)
                    .filter(|(entry, fate)| match entry {
                        LogEntry::Data { producer_id: None, .. } => true,
                        LogEntry::Data { .. } => *fate == Some(TransactionResult::Commit),
                        LogEntry::Control { .. } => false,
                    })
                    .filter_map(|(entry, _)| Self::visible(entry))
                    .collect()
            }
        }
    }

    fn visible(entry: &LogEntry) -> Option<VisibleRecord> {
        match entry {
            LogEntry::Data {
                offset,
                key,
                value,
                timestamp,
                ..
            } => Some(VisibleRecord {
                offset: *offset,
                key: key.clone(),
                value: value.clone(),
                timestamp: *timestamp,
            }),
            LogEntry::Control { .. } => None,
        }
    }

    /// For each entry, the outcome of the transaction it belongs to: the first
    /// marker for the same producer that follows it. `None` for undecided
    /// transactional entries and for entries that are not transactional.
    fn fates(&self) -> Vec<Option<TransactionResult>> {
        let mut next_marker: HashMap<i64, TransactionResult> = HashMap::new();
        let mut fates = vec![None; self.entries.len()];

        for (index, entry) in self.entries.iter().enumerate().rev() {
            match entry {
                LogEntry::Control {
                    producer_id,
                    result,
                    ..
                } => {
                    next_marker.insert(*producer_id, *result);
                }
                LogEntry::Data {
                    producer_id: Some(producer_id),
                    ..
                } => {
                    fates[index] = next_marker.get(producer_id).copied();
                }
                LogEntry::Data { .. } => {}
            }
        }

        fates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &str) -> ProduceRecord {
        ProduceRecord::new(None, Bytes::from(value.to_string()), 0)
    }

    fn values(records: &[VisibleRecord]) -> Vec<&[u8]> {
        records.iter().map(|r| r.value.as_ref()).collect()
    }

    #[test]
    fn test_append_assigns_offsets() {
        let mut log = PartitionLog::new();
        assert_eq!(log.append(None, vec![record("a"), record("b")]), 0);
        assert_eq!(log.append_marker(1, TransactionResult::Commit), 2);
        assert_eq!(log.append(Some(1), vec![record("c")]), 3);
        assert_eq!(log.high_watermark(), 4);
    }

    #[test]
    fn test_committed_read_hides_open_transaction() {
        let mut log = PartitionLog::new();
        log.append(Some(7), vec![record("txn")]);
        log.append(None, vec![record("plain")]);

        assert_eq!(log.last_stable_offset(), 0);
        assert!(log.read(IsolationLevel::ReadCommitted).is_empty());
        assert_eq!(
            values(&log.read(IsolationLevel::ReadUncommitted)),
            vec![b"txn".as_ref(), b"plain".as_ref()]
        );

        log.append_marker(7, TransactionResult::Commit);
        assert_eq!(log.last_stable_offset(), 3);
        assert_eq!(
            values(&log.read(IsolationLevel::ReadCommitted)),
            vec![b"txn".as_ref(), b"plain".as_ref()]
        );
    }

    #[test]
    fn test_aborted_records_are_skipped() {
        let mut log = PartitionLog::new();
        log.append(Some(1), vec![record("aborted")]);
        log.append_marker(1, TransactionResult::Abort);
        log.append(Some(1), vec![record("committed")]);
        log.append_marker(1, TransactionResult::Commit);

        assert_eq!(
            values(&log.read(IsolationLevel::ReadCommitted)),
            vec![b"committed".as_ref()]
        );
    }

    #[test]
    fn test_interleaved_producers() {
        let mut log = PartitionLog::new();
        log.append(Some(1), vec![record("p1")]);
        log.append(Some(2), vec![record("p2")]);
        log.append_marker(2, TransactionResult::Commit);

        // p1 still open, so p2's commit is not yet readable
        assert!(log.read(IsolationLevel::ReadCommitted).is_empty());

        log.append_marker(1, TransactionResult::Abort);
        assert_eq!(
            values(&log.read(IsolationLevel::ReadCommitted)),
            vec![b"p2".as_ref()]
        );
    }
}
