//! Visibility - resolves version stamps against transaction status
//!
//! A version is visible to a view when:
//! 1. its creator is visible under the isolation policy, and
//! 2. no visible transaction has ended it.
//!
//! A writer's commit timestamp comes from the status table, which is the
//! single place a commit is published. Flipping one status entry makes every
//! version of that transaction visible at once, or none of them.

use std::collections::{HashMap, HashSet};

use super::{IsolationPolicy, ReadView, Timestamp, Version};
use crate::txn::{TxnError, TxnId, TxnResult};

/// Lifecycle state of a transaction as seen by storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed(Timestamp),
    Aborted,
}

/// Status of every transaction that has touched a storage instance.
#[derive(Debug, Default)]
pub struct StatusTable {
    statuses: HashMap<TxnId, TxnStatus>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `txn` as active unless it is already known.
    pub fn register(&mut self, txn: TxnId) {
        self.statuses.entry(txn).or_insert(TxnStatus::Active);
    }

    /// Status of `txn`. Transactions never seen are reported as active.
    pub fn status(&self, txn: TxnId) -> TxnStatus {
        if txn == TxnId::FROZEN {
            return TxnStatus::Committed(Timestamp::ZERO);
        }
        self.statuses
            .get(&txn)
            .copied()
            .unwrap_or(TxnStatus::Active)
    }

    /// Number of tracked transactions.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Returns true if `txn` committed at or before `watermark`.
    pub fn is_settled(&self, txn: TxnId, watermark: Timestamp) -> bool {
        matches!(self.status(txn), TxnStatus::Committed(ts) if ts <= watermark)
    }

    /// Forgets finished transactions no version refers to any more.
    ///
    /// Active entries are always kept. Returns how many were dropped.
    pub fn retain_referenced(&mut self, referenced: &HashSet<TxnId>) -> usize {
        let before = self.statuses.len();
        self.statuses
            .retain(|id, status| *status == TxnStatus::Active || referenced.contains(id));
        before - self.statuses.len()
    }

    pub fn commit_ts(&self, txn: TxnId) -> Option<Timestamp> {
        match self.status(txn) {
            TxnStatus::Committed(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn is_active(&self, txn: TxnId) -> bool {
        self.status(txn) == TxnStatus::Active
    }

    /// Publishes the commit of `txn` at `ts`.
    pub fn commit(&mut self, txn: TxnId, ts: Timestamp) -> TxnResult<()> {
        match self.status(txn) {
            TxnStatus::Active => {
                self.statuses.insert(txn, TxnStatus::Committed(ts));
                Ok(())
            }
            _ => Err(TxnError::TxnNotActive {
                id: txn.to_string(),
            }),
        }
    }

    /// Marks `txn` aborted. Aborting twice is a no-op; aborting a
    /// committed transaction is rejected.
    pub fn abort(&mut self, txn: TxnId) -> TxnResult<()> {
        match self.status(txn) {
            TxnStatus::Committed(_) => Err(TxnError::TxnNotActive {
                id: txn.to_string(),
            }),
            _ => {
                self.statuses.insert(txn, TxnStatus::Aborted);
                Ok(())
            }
        }
    }
}

/// Visibility evaluator bound to one view.
pub struct Visibility<'a> {
    policy: &'a dyn IsolationPolicy,
    statuses: &'a StatusTable,
    view: ReadView,
}

impl<'a> Visibility<'a> {
    pub fn new(policy: &'a dyn IsolationPolicy, statuses: &'a StatusTable, view: ReadView) -> Self {
        Self {
            policy,
            statuses,
            view,
        }
    }

    pub fn view(&self) -> ReadView {
        self.view
    }

    pub fn statuses(&self) -> &StatusTable {
        self.statuses
    }

    pub fn policy(&self) -> &dyn IsolationPolicy {
        self.policy
    }

    /// Returns true if the effects of `writer` are visible.
    pub fn sees(&self, writer: TxnId) -> bool {
        self.policy
            .is_visible(self.statuses.commit_ts(writer), writer, &self.view)
    }

    /// Returns true if `version` is live for this view.
    pub fn sees_version<T>(&self, version: &Version<T>) -> bool {
        self.sees(version.created_by())
            && !version.deleted_by().map_or(false, |d| self.sees(d))
    }

    /// Returns the first writer of `version` that is another, still active
    /// transaction.
    pub fn foreign_intent<T>(&self, version: &Version<T>) -> Option<TxnId> {
        version
            .writers()
            .find(|w| *w != self.view.txn() && self.statuses.is_active(*w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::ReadCommitted;

    #[test]
    fn test_commit_publishes_all_versions_at_once() {
        let mut statuses = StatusTable::new();
        let writer = TxnId::new();
        let reader = TxnId::new();
        statuses.register(writer);

        let v1 = Version::new("a", writer);
        let v2 = Version::new("b", writer);
        let view = ReadView::new(reader, Timestamp::new(10));

        {
            let vis = Visibility::new(&ReadCommitted, &statuses, view);
            assert!(!vis.sees_version(&v1));
            assert!(!vis.sees_version(&v2));
        }

        statuses.commit(writer, Timestamp::new(5)).unwrap();
        let vis = Visibility::new(&ReadCommitted, &statuses, view);
        assert!(vis.sees_version(&v1));
        assert!(vis.sees_version(&v2));
    }

    #[test]
    fn test_aborted_writer_is_invisible() {
        let mut statuses = StatusTable::new();
        let writer = TxnId::new();
        statuses.register(writer);
        statuses.abort(writer).unwrap();

        let version = Version::new((), writer);
        let view = ReadView::new(TxnId::new(), Timestamp::new(100));
        let vis = Visibility::new(&ReadCommitted, &statuses, view);
        assert!(!vis.sees_version(&version));
        assert!(vis.foreign_intent(&version).is_none());
    }

    #[test]
    fn test_delete_visible_only_after_commit() {
        let mut statuses = StatusTable::new();
        let creator = TxnId::new();
        let deleter = TxnId::new();
        statuses.commit(creator, Timestamp::new(1)).unwrap();
        statuses.register(deleter);

        let mut version = Version::new((), creator);
        version.mark_deleted(deleter);
        let view = ReadView::new(TxnId::new(), Timestamp::new(10));

        {
            let vis = Visibility::new(&ReadCommitted, &statuses, view);
            assert!(vis.sees_version(&version));
            assert_eq!(vis.foreign_intent(&version), Some(deleter));
        }

        statuses.commit(deleter, Timestamp::new(8)).unwrap();
        let vis = Visibility::new(&ReadCommitted, &statuses, view);
        assert!(!vis.sees_version(&version));
    }

    #[test]
    fn test_frozen_writer_is_committed_at_zero() {
        let statuses = StatusTable::new();
        assert_eq!(statuses.commit_ts(TxnId::FROZEN), Some(Timestamp::ZERO));
        assert!(statuses.is_settled(TxnId::FROZEN, Timestamp::ZERO));

        let version = Version::new((), TxnId::FROZEN);
        let view = ReadView::new(TxnId::new(), Timestamp::new(1));
        let vis = Visibility::new(&ReadCommitted, &statuses, view);
        assert!(vis.sees_version(&version));
        assert!(vis.foreign_intent(&version).is_none());
    }

    #[test]
    fn test_retain_referenced_keeps_active_and_referenced() {
        let mut statuses = StatusTable::new();
        let active = TxnId::new();
        let referenced = TxnId::new();
        let forgotten = TxnId::new();
        let aborted = TxnId::new();
        statuses.register(active);
        statuses.commit(referenced, Timestamp::new(1)).unwrap();
        statuses.commit(forgotten, Timestamp::new(2)).unwrap();
        statuses.abort(aborted).unwrap();

        let keep: HashSet<TxnId> = [referenced].into_iter().collect();
        assert_eq!(statuses.retain_referenced(&keep), 2);
        assert_eq!(statuses.len(), 2);
        assert!(statuses.is_active(active));
        assert!(statuses.is_settled(referenced, Timestamp::new(1)));
        assert!(!statuses.is_settled(referenced, Timestamp::ZERO));
    }

    #[test]
    fn test_status_transitions() {
        let mut statuses = StatusTable::new();
        let txn = TxnId::new();

        statuses.commit(txn, Timestamp::new(3)).unwrap();
        assert_eq!(statuses.commit_ts(txn), Some(Timestamp::new(3)));
        assert!(matches!(
            statuses.commit(txn, Timestamp::new(4)),
            Err(TxnError::TxnNotActive { .. })
        ));
        assert!(statuses.abort(txn).is_err());

        let other = TxnId::new();
        statuses.abort(other).unwrap();
        statuses.abort(other).unwrap();
        assert!(statuses.commit(other, Timestamp::new(9)).is_err());
    }
}
