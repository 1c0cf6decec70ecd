//! # Transaction Errors
//!
//! Typed not-found / conflict signals shared by storage, the shard service
//! and the metadata resolver. Payload fields are diagnostic only.

use thiserror::Error;

/// Result type for transactional operations
pub type TxnResult<T> = Result<T, TxnError>;

/// Transactional core errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    // Catalog errors
    #[error("existed")]
    Existed,

    #[error("database not found: [{name}] [{id}]")]
    DatabaseNotFound { id: String, name: String },

    #[error("relation not found: [{name}] [{id}]")]
    RelationNotFound { id: String, name: String },

    #[error("definition not found: [{name}] [{id}]")]
    DefNotFound { id: String, name: String },

    #[error("iter not found: {id}")]
    IterNotFound { id: String },

    #[error("column not found: {name}")]
    ColumnNotFound { name: String },

    #[error("constraint violation on column {column}: {reason}")]
    ConstraintViolation { column: String, reason: String },

    // Concurrency errors
    #[error("write conflict on {relation} key {key}: held by txn {holder}")]
    WriteConflict {
        relation: String,
        key: String,
        holder: String,
    },

    #[error("transaction not active: {id}")]
    TxnNotActive { id: String },

    #[error("snapshot too old: begin {begin_ts} below collected history at {watermark}")]
    SnapshotTooOld { begin_ts: u64, watermark: u64 },

    // Service errors
    #[error("shard {shard} unavailable: {state}")]
    ServiceUnavailable { shard: u64, state: String },

    #[error("remote shard {address} failed: {message}")]
    Remote { address: String, message: String },

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TxnError {
    pub fn database_not_found(name: impl Into<String>) -> Self {
        TxnError::DatabaseNotFound {
            id: String::new(),
            name: name.into(),
        }
    }

    pub fn relation_not_found(name: impl Into<String>) -> Self {
        TxnError::RelationNotFound {
            id: String::new(),
            name: name.into(),
        }
    }

    pub fn column_not_found(name: impl Into<String>) -> Self {
        TxnError::ColumnNotFound { name: name.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TxnError::Internal(msg.into())
    }

    /// True for the two lookup failures a compiler treats as "unresolvable"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TxnError::DatabaseNotFound { .. } | TxnError::RelationNotFound { .. }
        )
    }

    /// True if the error was caused by a concurrent transaction
    pub fn is_conflict(&self) -> bool {
        matches!(self, TxnError::WriteConflict { .. })
    }

    /// Stable error code for diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            TxnError::Existed => "EXISTED",
            TxnError::DatabaseNotFound { .. } => "DATABASE_NOT_FOUND",
            TxnError::RelationNotFound { .. } => "RELATION_NOT_FOUND",
            TxnError::DefNotFound { .. } => "DEF_NOT_FOUND",
            TxnError::IterNotFound { .. } => "ITER_NOT_FOUND",
            TxnError::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            TxnError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            TxnError::WriteConflict { .. } => "WRITE_CONFLICT",
            TxnError::TxnNotActive { .. } => "TXN_NOT_ACTIVE",
            TxnError::SnapshotTooOld { .. } => "SNAPSHOT_TOO_OLD",
            TxnError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            TxnError::Remote { .. } => "REMOTE_FAILED",
            TxnError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Lock poisoning only happens after a panic while holding the guard
impl<T> From<std::sync::PoisonError<T>> for TxnError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        TxnError::Internal("Lock poisoned".into())
    }
}
