//! Isolation policies
//!
//! A policy is fixed per storage instance and consulted on every read.
//! The one required rule is the visibility predicate over
//! (commit timestamp of the writer, writer id, read view). Stricter levels
//! override the provided hooks instead of changing the storage interface.

use std::fmt;

use super::{ReadView, Timestamp};
use crate::txn::TxnId;

/// Strategy deciding which versions a transaction may observe.
pub trait IsolationPolicy: Send + Sync + fmt::Debug {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Returns true if a version written by `writer` is visible to `view`.
    ///
    /// `write_ts` is the writer's commit timestamp, `None` while the writer
    /// is still active or after it aborted.
    fn is_visible(&self, write_ts: Option<Timestamp>, writer: TxnId, view: &ReadView) -> bool;

    /// Picks the read timestamp for an operation issued at `now` by a
    /// transaction that began at `begin_ts`.
    fn read_timestamp(&self, _begin_ts: Timestamp, now: Timestamp) -> Timestamp {
        now
    }

    /// Returns true if writing over a row last committed at `latest_commit`
    /// must be rejected for a transaction reading at `view`.
    fn write_conflicts(&self, _latest_commit: Timestamp, _view: &ReadView) -> bool {
        false
    }
}

/// Own writes plus everything committed at or before the read timestamp.
fn committed_or_own(write_ts: Option<Timestamp>, writer: TxnId, view: &ReadView) -> bool {
    writer == view.txn() || write_ts.map_or(false, |ts| ts <= view.read_ts())
}

/// Each read observes every commit up to its own issue time.
///
/// There is no per-transaction snapshot: two reads in one transaction may
/// observe different committed states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCommitted;

impl IsolationPolicy for ReadCommitted {
    fn name(&self) -> &'static str {
        "read-committed"
    }

    fn is_visible(&self, write_ts: Option<Timestamp>, writer: TxnId, view: &ReadView) -> bool {
        committed_or_own(write_ts, writer, view)
    }
}

/// All reads of a transaction observe the state as of its begin timestamp.
/// Writes over rows committed after that point are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotIsolation;

impl IsolationPolicy for SnapshotIsolation {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn is_visible(&self, write_ts: Option<Timestamp>, writer: TxnId, view: &ReadView) -> bool {
        committed_or_own(write_ts, writer, view)
    }

    fn read_timestamp(&self, begin_ts: Timestamp, _now: Timestamp) -> Timestamp {
        begin_ts
    }

    fn write_conflicts(&self, latest_commit: Timestamp, view: &ReadView) -> bool {
        latest_commit > view.read_ts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_at(txn: TxnId, ts: u64) -> ReadView {
        ReadView::new(txn, Timestamp::new(ts))
    }

    #[test]
    fn test_read_committed_sees_commit_at_or_before_read() {
        let reader = TxnId::new();
        let writer = TxnId::new();
        let view = view_at(reader, 20);

        assert!(ReadCommitted.is_visible(Some(Timestamp::new(10)), writer, &view));
        assert!(ReadCommitted.is_visible(Some(Timestamp::new(20)), writer, &view));
        assert!(!ReadCommitted.is_visible(Some(Timestamp::new(21)), writer, &view));
    }

    #[test]
    fn test_uncommitted_writes_visible_only_to_writer() {
        let reader = TxnId::new();
        let writer = TxnId::new();

        assert!(!ReadCommitted.is_visible(None, writer, &view_at(reader, 100)));
        assert!(ReadCommitted.is_visible(None, writer, &view_at(writer, 100)));
    }

    #[test]
    fn test_read_committed_reads_at_issue_time() {
        let ts = ReadCommitted.read_timestamp(Timestamp::new(5), Timestamp::new(50));
        assert_eq!(ts, Timestamp::new(50));
        assert!(!ReadCommitted.write_conflicts(Timestamp::new(60), &view_at(TxnId::new(), 50)));
    }

    #[test]
    fn test_snapshot_reads_at_begin_time() {
        let ts = SnapshotIsolation.read_timestamp(Timestamp::new(5), Timestamp::new(50));
        assert_eq!(ts, Timestamp::new(5));
    }

    #[test]
    fn test_snapshot_rejects_write_over_newer_commit() {
        let view = view_at(TxnId::new(), 5);
        assert!(SnapshotIsolation.write_conflicts(Timestamp::new(6), &view));
        assert!(!SnapshotIsolation.write_conflicts(Timestamp::new(5), &view));
    }

    #[test]
    fn test_policy_is_object_safe() {
        let policies: Vec<Box<dyn IsolationPolicy>> =
            vec![Box::new(ReadCommitted), Box::new(SnapshotIsolation)];
        let names: Vec<_> = policies.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["read-committed", "snapshot"]);
    }
}
