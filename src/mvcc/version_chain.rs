//! VersionChain - version history of one row key
//!
//! Versions are appended in write order. At most one version per chain may
//! carry an uncommitted writer from another transaction; write paths check
//! `foreign_intent` before appending.

use super::{Timestamp, Version, Visibility};
use crate::txn::TxnId;

/// The version history of a single logical key.
#[derive(Clone, Debug)]
pub struct VersionChain<T> {
    versions: Vec<Version<T>>,
}

impl<T> Default for VersionChain<T> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
        }
    }
}

impl<T> VersionChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Raw accessor. No visibility filtering is performed.
    #[inline]
    pub fn versions(&self) -> &[Version<T>] {
        &self.versions
    }

    pub fn push(&mut self, version: Version<T>) {
        self.versions.push(version);
    }

    /// Index of the newest version live for `vis`.
    pub fn visible_index(&self, vis: &Visibility<'_>) -> Option<usize> {
        self.versions.iter().rposition(|v| vis.sees_version(v))
    }

    /// Newest version live for `vis`.
    pub fn visible(&self, vis: &Visibility<'_>) -> Option<&Version<T>> {
        self.visible_index(vis).map(|i| &self.versions[i])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Version<T>> {
        self.versions.get_mut(index)
    }

    /// Another active transaction holding a write on this key, if any.
    pub fn foreign_intent(&self, vis: &Visibility<'_>) -> Option<TxnId> {
        self.versions.iter().find_map(|v| vis.foreign_intent(v))
    }

    /// Largest commit timestamp among all writers in the chain.
    pub fn latest_commit(&self, vis: &Visibility<'_>) -> Option<Timestamp> {
        self.versions
            .iter()
            .flat_map(|v| v.writers())
            .filter_map(|w| vis.statuses().commit_ts(w))
            .max()
    }

    /// Drops versions ended by a settled writer and freezes versions created
    /// by one. Returns the dropped versions.
    ///
    /// `settled` must only accept writers whose commit every current and
    /// future view observes.
    pub fn prune(&mut self, settled: impl Fn(TxnId) -> bool) -> Vec<Version<T>> {
        let (dropped, mut kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.versions)
            .into_iter()
            .partition(|v| v.deleted_by().map_or(false, &settled));
        for version in &mut kept {
            if version.created_by() != TxnId::FROZEN && settled(version.created_by()) {
                version.freeze();
            }
        }
        self.versions = kept;
        dropped
    }

    /// Every writer stamp still referenced by this chain.
    pub fn writers(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.versions.iter().flat_map(|v| v.writers())
    }

    /// Undoes every effect of `txn` on this chain.
    pub fn rollback(&mut self, txn: TxnId) {
        self.versions.retain(|v| v.created_by() != txn);
        for version in &mut self.versions {
            version.clear_deleted_by(txn);
        }
    }
}
