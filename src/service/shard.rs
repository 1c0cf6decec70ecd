//! Shard identity

use serde::{Deserialize, Serialize};

/// Identity of one shard replica and the address its service answers on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    pub shard_id: u64,
    pub log_shard_id: u64,
    pub replica_id: u64,
    pub address: String,
}

impl Shard {
    /// A shard whose log shard and replica ids equal its shard id.
    pub fn new(shard_id: u64) -> Self {
        Self {
            shard_id,
            log_shard_id: shard_id,
            replica_id: shard_id,
            address: format!("shard-{}", shard_id),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_address() {
        let shard = Shard::new(3);
        assert_eq!(shard.address, "shard-3");
        assert_eq!(shard.with_address("10.0.0.1:6001").address, "10.0.0.1:6001");
    }
}
