//! Resolution errors

use thiserror::Error;

use crate::txn::TxnError;

/// Result type for compiler-facing resolution
pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A storage failure other than a soft not-found
    #[error(transparent)]
    Storage(#[from] TxnError),

    /// The operation is intentionally not provided here
    #[error("unimplemented: {what}")]
    Unimplemented { what: String },
}

impl ResolveError {
    pub fn unimplemented(what: impl Into<String>) -> Self {
        ResolveError::Unimplemented { what: what.into() }
    }
}
