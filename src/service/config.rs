//! Service configuration
//!
//! Configured by the embedding process and fixed once the service is built.

use std::time::Duration;

use crate::txn::{TxnError, TxnResult};

/// Idle transactions older than this are aborted by the sweeper
pub const DEFAULT_TXN_TIMEOUT: Duration = Duration::from_secs(61);

/// Default upper bound on rows per iterator batch
pub const DEFAULT_MAX_BATCH_ROWS: usize = 1024;

/// Commits between two garbage collection passes
pub const DEFAULT_GC_INTERVAL: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How long a transaction may stay idle before it is aborted.
    pub txn_timeout: Duration,

    /// Upper bound on rows returned by a single `next_batch`.
    pub max_batch_rows: usize,

    /// Number of local commits after which storage history is collected.
    pub gc_interval: u64,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }

    pub fn with_max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows;
        self
    }

    pub fn with_gc_interval(mut self, commits: u64) -> Self {
        self.gc_interval = commits;
        self
    }

    /// Validate the configuration.
    ///
    /// Every limit must be non-zero.
    pub fn validate(&self) -> TxnResult<()> {
        if self.txn_timeout.is_zero() {
            return Err(TxnError::internal("txn_timeout must be non-zero"));
        }
        if self.max_batch_rows == 0 {
            return Err(TxnError::internal("max_batch_rows must be non-zero"));
        }
        if self.gc_interval == 0 {
            return Err(TxnError::internal("gc_interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            txn_timeout: DEFAULT_TXN_TIMEOUT,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}
