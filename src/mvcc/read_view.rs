//! ReadView - the boundary a single read or write evaluates against
//!
//! A view pairs the acting transaction with the timestamp its isolation
//! policy picked for this operation. Under read-committed that is the
//! operation's issue time; under snapshot isolation it is the begin time.

use super::Timestamp;
use crate::txn::TxnId;

/// A stable visibility boundary for one storage operation.
///
/// Once established, a read view never changes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReadView {
    /// The transaction performing the operation.
    txn: TxnId,
    /// The largest commit timestamp visible to this operation.
    read_ts: Timestamp,
}

impl ReadView {
    #[inline]
    pub fn new(txn: TxnId, read_ts: Timestamp) -> Self {
        Self { txn, read_ts }
    }

    /// Returns the acting transaction.
    #[inline]
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Returns the read timestamp.
    ///
    /// Versions committed after this timestamp are invisible.
    #[inline]
    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }
}
