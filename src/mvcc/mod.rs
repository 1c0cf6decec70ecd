//! MVCC Domain Types
//!
//! This module provides:
//! - `Timestamp` - Totally ordered clock reading
//! - `Clock` - Injected timestamp authority, `MonotonicClock` default
//! - `ReadView` - Boundary of one read or write
//! - `IsolationPolicy` - Pluggable visibility strategy
//! - `Version` / `VersionChain` - Writer-stamped row history
//! - `Visibility` - Stamp resolution against the transaction status table

mod clock;
mod isolation;
mod read_view;
mod timestamp;
mod version;
mod version_chain;
mod visibility;

pub use clock::{Clock, MonotonicClock};
pub use isolation::{IsolationPolicy, ReadCommitted, SnapshotIsolation};
pub use read_view::ReadView;
pub use timestamp::Timestamp;
pub use version::Version;
pub use version_chain::VersionChain;
pub use visibility::{StatusTable, TxnStatus, Visibility};
