//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shardtxn::catalog::{AttributeDef, RelationDef, TypeDesc};
use shardtxn::mvcc::{Clock, IsolationPolicy, MonotonicClock, ReadCommitted, Timestamp};
use shardtxn::service::{NoopSender, Sender, ServiceConfig, Shard, ShardTxnService};
use shardtxn::storage::MemHandler;
use shardtxn::SessionContext;

pub fn session() -> SessionContext {
    SessionContext::new("db1")
}

/// Clock stuck at one reading. Legal: readings never go backwards.
pub struct FlatClock(pub u64);

impl Clock for FlatClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.0)
    }
}

/// Clock advancing by one every `every` readings.
pub struct SteppingClock {
    readings: AtomicU64,
    every: u64,
}

impl SteppingClock {
    pub fn new(every: u64) -> Self {
        Self {
            readings: AtomicU64::new(0),
            every,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.readings.fetch_add(1, Ordering::SeqCst) / self.every + 1)
    }
}

pub fn build_service(
    shard: u64,
    policy: impl IsolationPolicy + 'static,
    sender: Arc<dyn Sender>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
) -> Arc<ShardTxnService> {
    let service = ShardTxnService::new(
        Shard::new(shard),
        Arc::new(MemHandler::new(policy)),
        sender,
        clock,
        config,
    )
    .unwrap();
    service.start().unwrap();
    Arc::new(service)
}

pub fn service_with(
    shard: u64,
    policy: impl IsolationPolicy + 'static,
    sender: Arc<dyn Sender>,
) -> Arc<ShardTxnService> {
    build_service(
        shard,
        policy,
        sender,
        Arc::new(MonotonicClock::logical()),
        ServiceConfig::default(),
    )
}

pub fn service_on_clock(
    policy: impl IsolationPolicy + 'static,
    clock: Arc<dyn Clock>,
) -> Arc<ShardTxnService> {
    build_service(1, policy, Arc::new(NoopSender), clock, ServiceConfig::default())
}

pub fn service() -> Arc<ShardTxnService> {
    service_with(1, ReadCommitted, Arc::new(NoopSender))
}

/// db1.t1(id int64 primary, name varchar(20))
pub fn t1_def() -> RelationDef {
    RelationDef::new("t1")
        .attribute(AttributeDef::new("id", TypeDesc::int64()).primary())
        .attribute(AttributeDef::new("name", TypeDesc::varchar(20)))
}

/// Creates and commits db1.t1.
pub fn create_t1(service: &ShardTxnService) {
    let txn = service.begin(session()).unwrap();
    service.create_database(&txn, "db1").unwrap();
    service.create_relation(&txn, "db1", t1_def()).unwrap();
    service.commit(txn).unwrap();
}
