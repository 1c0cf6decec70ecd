//! Transaction handles
//!
//! A `Txn` is owned by the session that began it. It is not `Clone`:
//! `commit` and `abort` take it by value, so a finalized transaction cannot
//! be used again.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::mvcc::Timestamp;
use crate::service::Shard;

/// Globally unique transaction identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Writer stamp of versions whose commit is older than every live view.
    ///
    /// Never produced by `new`: v4 identities always carry version bits.
    pub const FROZEN: TxnId = TxnId(Uuid::nil());

    /// Generates a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session state a transaction carries for name resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Database used when a statement omits the schema name.
    pub current_db: String,
}

impl SessionContext {
    pub fn new(current_db: impl Into<String>) -> Self {
        Self {
            current_db: current_db.into(),
        }
    }
}

/// An active transaction.
#[derive(Debug)]
pub struct Txn {
    id: TxnId,
    begin_ts: Timestamp,
    session: SessionContext,
    /// Remote shards that received writes from this transaction.
    participants: Vec<Shard>,
}

impl Txn {
    pub(crate) fn new(id: TxnId, begin_ts: Timestamp, session: SessionContext) -> Self {
        Self {
            id,
            begin_ts,
            session,
            participants: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[inline]
    pub fn begin_ts(&self) -> Timestamp {
        self.begin_ts
    }

    #[inline]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Switches the session's current database.
    pub fn use_database(&mut self, name: impl Into<String>) {
        self.session.current_db = name.into();
    }

    pub fn participants(&self) -> &[Shard] {
        &self.participants
    }

    /// Enlists a remote shard. Enlisting the same shard twice is a no-op.
    pub(crate) fn enlist(&mut self, shard: &Shard) {
        if !self.participants.iter().any(|s| s.shard_id == shard.shard_id) {
            self.participants.push(shard.clone());
        }
    }
}
