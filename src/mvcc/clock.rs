//! Clock - timestamp authority for a shard
//!
//! The clock is an injected dependency. The only contract the core relies
//! on is that readings never go backwards.
//!
//! `MonotonicClock` tracks the highest timestamp it has issued or observed
//! and never hands out anything lower. With a wall source it behaves like a
//! hybrid logical clock: wall microseconds when they move forward, a
//! logical bump otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::Timestamp;

/// Source of monotonically non-decreasing timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;

    /// Advances the clock so later readings are at least `ts`.
    ///
    /// Called when a timestamp arrives from another shard.
    fn observe(&self, _ts: Timestamp) {}
}

/// Strictly increasing in-process clock.
#[derive(Debug)]
pub struct MonotonicClock {
    /// Highest timestamp issued or observed so far.
    highest: AtomicU64,
    /// Whether wall-clock microseconds feed the physical component.
    wall: bool,
}

impl MonotonicClock {
    /// A purely logical clock starting from zero.
    pub fn logical() -> Self {
        Self {
            highest: AtomicU64::new(0),
            wall: false,
        }
    }

    /// A logical clock resuming after `ts`.
    pub fn starting_after(ts: Timestamp) -> Self {
        Self {
            highest: AtomicU64::new(ts.value()),
            wall: false,
        }
    }

    /// A hybrid clock fed by system time.
    pub fn wall() -> Self {
        Self {
            highest: AtomicU64::new(0),
            wall: true,
        }
    }

    /// Highest timestamp issued or observed so far.
    pub fn highest(&self) -> Timestamp {
        Timestamp::new(self.highest.load(Ordering::Acquire))
    }

    fn physical_micros(&self) -> u64 {
        if !self.wall {
            return 0;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::logical()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let physical = self.physical_micros();
        let mut prev = self.highest.load(Ordering::Acquire);
        loop {
            let next = physical.max(prev + 1);
            match self.highest.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::new(next),
                Err(actual) => prev = actual,
            }
        }
    }

    fn observe(&self, ts: Timestamp) {
        self.highest.fetch_max(ts.value(), Ordering::AcqRel);
    }
}
