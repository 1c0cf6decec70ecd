//! Observability for the shard transaction core
//!
//! - Structured logging (one JSON line per event)
//! - Counter metrics
//! - Typed transaction lifecycle events
//!
//! Observability is read-only: nothing here feeds back into execution.
//!
//! ```ignore
//! use shardtxn::observability::{Event, Logger, MetricsRegistry};
//!
//! Logger::info(Event::TxnCommit.as_str(), &[("txn", "…")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_committed();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
