//! shardtxn - per-shard transactional execution core
//!
//! A shard service runs transactions against a pluggable storage handler
//! under an isolation policy, and answers schema questions for a query
//! compiler.

pub mod catalog;
pub mod mvcc;
pub mod observability;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod txn;
pub mod vectorize;

pub use service::{ServiceConfig, Shard, ShardTxnService};
pub use txn::{SessionContext, Txn, TxnError, TxnId, TxnResult};
