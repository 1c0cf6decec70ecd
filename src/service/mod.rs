//! Shard transaction service
//!
//! One `ShardTxnService` per shard. Storage, clock and the shard-to-shard
//! transport are injected; the service itself keeps only the table of
//! active transactions and the commit ordering fence.

mod config;
mod sender;
#[allow(clippy::module_inception)]
mod service;
mod shard;

pub use config::{ServiceConfig, DEFAULT_GC_INTERVAL, DEFAULT_MAX_BATCH_ROWS, DEFAULT_TXN_TIMEOUT};
pub use sender::{LocalSender, NoopSender, Sender, TxnRequest, TxnResponse};
pub use service::{ServiceState, ShardTxnService};
pub use shard::Shard;
