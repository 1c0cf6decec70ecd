//! Timestamp - Totally ordered clock reading
//!
//! Begin, read and commit points are all expressed as timestamps issued by
//! the shard's `Clock`. Visibility compares timestamps and nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, totally ordered clock reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The smallest timestamp. Nothing is committed at or before it.
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// This accessor exists for wire encoding and debugging only.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The smallest timestamp strictly after this one.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::new(10);
        let t2 = Timestamp::new(20);

        assert!(t1 < t2);
        assert!(Timestamp::ZERO < t1);
        assert_eq!(t1.max(t2), t2);
        assert_eq!(t1.next(), Timestamp::new(11));
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::new(123).to_string(), "123");
    }
}
