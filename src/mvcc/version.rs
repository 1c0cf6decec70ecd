//! Version - one write of a row or catalog entry
//!
//! A version records who created it and, once superseded or deleted, who
//! ended it. Whether either event is visible is decided later against the
//! transaction status table, so publishing a commit never touches versions.

use crate::txn::TxnId;

/// A single version of some payload, stamped with its writers.
#[derive(Clone, Debug, PartialEq)]
pub struct Version<T> {
    /// The stored payload.
    payload: T,
    /// Transaction that wrote this version.
    created_by: TxnId,
    /// Transaction that superseded or deleted this version, if any.
    deleted_by: Option<TxnId>,
}

impl<T> Version<T> {
    pub fn new(payload: T, created_by: TxnId) -> Self {
        Self {
            payload,
            created_by,
            deleted_by: None,
        }
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[inline]
    pub fn created_by(&self) -> TxnId {
        self.created_by
    }

    #[inline]
    pub fn deleted_by(&self) -> Option<TxnId> {
        self.deleted_by
    }

    /// Marks this version as ended by `txn`.
    pub fn mark_deleted(&mut self, txn: TxnId) {
        self.deleted_by = Some(txn);
    }

    /// Clears the end marker if it belongs to `txn`.
    pub fn clear_deleted_by(&mut self, txn: TxnId) {
        if self.deleted_by == Some(txn) {
            self.deleted_by = None;
        }
    }

    /// Restamps the creator as `TxnId::FROZEN`.
    ///
    /// Only valid once the creator's commit is visible to every view.
    pub fn freeze(&mut self) {
        self.created_by = TxnId::FROZEN;
    }

    /// Iterates over both writer stamps.
    pub fn writers(&self) -> impl Iterator<Item = TxnId> {
        std::iter::once(self.created_by).chain(self.deleted_by)
    }
}
