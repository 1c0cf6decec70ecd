//! Per-shard transaction service
//!
//! Owns the transaction lifecycle of one shard: hands out begin timestamps,
//! routes reads and writes to storage under the transaction's view and
//! finalizes transactions, coordinating remote participants when a
//! transaction wrote to more than one shard.
//!
//! Ordering: every read or write holds the fence shared from the moment its
//! read timestamp is drawn until storage returns; commit holds it exclusive
//! while drawing and publishing the commit timestamp. A read therefore sees
//! exactly the commits stamped at or before its read timestamp.
//!
//! The clock only promises non-decreasing readings, so the service keeps the
//! highest timestamp it has issued. Begin and read timestamps never fall
//! below it and a commit timestamp is always strictly above it.
//!
//! Garbage collection runs with the fence held exclusively, below the
//! oldest begin timestamp still tracked.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::catalog::{Database, DatabaseId, Relation, RelationDef, RelationId, Row, TableDef};
use crate::mvcc::{Clock, ReadView, Timestamp};
use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot};
use crate::storage::{GcStats, IterId, Mutation, Predicate, StorageHandler};
use crate::txn::{SessionContext, Txn, TxnError, TxnId, TxnResult};

use super::{Sender, ServiceConfig, Shard, TxnRequest, TxnResponse};

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
    /// Storage failed to start
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveTxn {
    begin_ts: Timestamp,
    last_active: Instant,
    /// Voted yes to a coordinator; only the coordinator may finish it now
    prepared: bool,
}

impl ActiveTxn {
    fn new(begin_ts: Timestamp) -> Self {
        Self {
            begin_ts,
            last_active: Instant::now(),
            prepared: false,
        }
    }
}

/// Transaction service for a single shard.
pub struct ShardTxnService {
    shard: Shard,
    storage: Arc<dyn StorageHandler>,
    sender: Arc<dyn Sender>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    state: RwLock<ServiceState>,
    active: Mutex<HashMap<TxnId, ActiveTxn>>,
    fence: RwLock<()>,
    /// Highest begin, read or commit timestamp handed out
    issued: AtomicU64,
    /// Watermark of the last garbage collection
    collected_below: AtomicU64,
    /// Local commits since the last garbage collection
    commits_since_gc: AtomicU64,
    metrics: MetricsRegistry,
}

impl ShardTxnService {
    /// Builds a stopped service. Call `start` before use.
    pub fn new(
        shard: Shard,
        storage: Arc<dyn StorageHandler>,
        sender: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> TxnResult<Self> {
        config.validate()?;
        Ok(Self {
            shard,
            storage,
            sender,
            clock,
            config,
            state: RwLock::new(ServiceState::Stopped),
            active: Mutex::new(HashMap::new()),
            fence: RwLock::new(()),
            issued: AtomicU64::new(0),
            collected_below: AtomicU64::new(0),
            commits_since_gc: AtomicU64::new(0),
            metrics: MetricsRegistry::new(),
        })
    }

    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> TxnResult<ServiceState> {
        Ok(*self.state.read()?)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of transactions this service is tracking.
    pub fn active_count(&self) -> TxnResult<usize> {
        Ok(self.active.lock()?.len())
    }

    // ==================
    // Lifecycle
    // ==================

    /// Starts storage. A failure leaves the service `Failed` and unusable
    /// until a later `start` succeeds.
    pub fn start(&self) -> TxnResult<()> {
        let mut state = self.state.write()?;
        if *state == ServiceState::Running {
            return Ok(());
        }
        let shard = self.shard.shard_id.to_string();
        match self.storage.start() {
            Ok(()) => {
                *state = ServiceState::Running;
                Logger::event(
                    Event::ServiceStart,
                    &[("shard", &shard), ("isolation", self.storage.isolation().name())],
                );
                Ok(())
            }
            Err(e) => {
                *state = ServiceState::Failed;
                Logger::event(
                    Event::ServiceStartFailed,
                    &[("shard", &shard), ("error", &e.to_string())],
                );
                Err(e)
            }
        }
    }

    /// Aborts every transaction still tracked and stops the service.
    pub fn stop(&self) -> TxnResult<()> {
        let mut state = self.state.write()?;
        let drained: Vec<TxnId> = self.active.lock()?.drain().map(|(id, _)| id).collect();
        for id in &drained {
            if let Err(e) = self.storage.abort(*id) {
                Logger::warn(
                    Event::TxnAbort.as_str(),
                    &[("txn", &id.to_string()), ("error", &e.to_string())],
                );
            }
        }
        self.metrics.add_aborted(drained.len() as u64);
        *state = ServiceState::Stopped;
        Logger::event(
            Event::ServiceStop,
            &[
                ("shard", &self.shard.shard_id.to_string()),
                ("aborted", &drained.len().to_string()),
            ],
        );
        Ok(())
    }

    fn ensure_running(&self) -> TxnResult<()> {
        let state = *self.state.read()?;
        if state == ServiceState::Running {
            Ok(())
        } else {
            Err(TxnError::ServiceUnavailable {
                shard: self.shard.shard_id,
                state: state.to_string(),
            })
        }
    }

    // ==================
    // Transaction lifecycle
    // ==================

    /// Starts a transaction. Storage is not touched.
    pub fn begin(&self, session: SessionContext) -> TxnResult<Txn> {
        self.ensure_running()?;
        self.sweep_expired()?;

        let id = TxnId::new();
        let begin_ts = {
            let _fence = self.fence.read()?;
            let begin_ts = self.issue();
            self.active.lock()?.insert(id, ActiveTxn::new(begin_ts));
            begin_ts
        };
        self.metrics.increment_begun();
        Logger::event(
            Event::TxnBegin,
            &[("txn", &id.to_string()), ("begin_ts", &begin_ts.to_string())],
        );
        Ok(Txn::new(id, begin_ts, session))
    }

    /// Commits `txn`, returning its commit timestamp.
    ///
    /// With remote participants this runs two-phase commit: every
    /// participant must vote yes before anything is published. On any
    /// refusal all participants and the local shard abort.
    pub fn commit(&self, txn: Txn) -> TxnResult<Timestamp> {
        self.ensure_running()?;
        self.deactivate(txn.id())?;

        if let Err(e) = self.prepare_participants(&txn) {
            self.abort_everywhere(&txn)?;
            return Err(e);
        }

        let commit_ts = match self.publish(txn.id(), None) {
            Ok(ts) => ts,
            Err(e) => {
                self.abort_everywhere(&txn)?;
                return Err(e);
            }
        };

        for shard in txn.participants() {
            let sent = self
                .sender
                .send(&shard.address, TxnRequest::Commit { txn: txn.id(), commit_ts })
                .and_then(|r| r.into_result(&shard.address));
            // The decision is made; a participant that missed it is repaired
            // out of band
            if let Err(e) = sent {
                Logger::event(
                    Event::ParticipantFailed,
                    &[
                        ("txn", &txn.id().to_string()),
                        ("address", &shard.address),
                        ("error", &e.to_string()),
                    ],
                );
            }
        }

        self.metrics.increment_committed();
        Logger::event(
            Event::TxnCommit,
            &[
                ("txn", &txn.id().to_string()),
                ("commit_ts", &commit_ts.to_string()),
                ("participants", &txn.participants().len().to_string()),
            ],
        );
        self.collect_if_due();
        Ok(commit_ts)
    }

    /// Discards every effect of `txn` on this shard and its participants.
    pub fn abort(&self, txn: Txn) -> TxnResult<()> {
        self.ensure_running()?;
        self.deactivate(txn.id())?;
        self.abort_everywhere(&txn)
    }

    fn prepare_participants(&self, txn: &Txn) -> TxnResult<()> {
        for shard in txn.participants() {
            Logger::event(
                Event::PrepareSent,
                &[("txn", &txn.id().to_string()), ("address", &shard.address)],
            );
            let response = self
                .sender
                .send(&shard.address, TxnRequest::Prepare { txn: txn.id() })
                .and_then(|r| r.into_result(&shard.address));
            match response {
                Ok(TxnResponse::Prepared) => {}
                Ok(other) => {
                    return Err(TxnError::Remote {
                        address: shard.address.clone(),
                        message: format!("unexpected prepare reply: {:?}", other),
                    })
                }
                Err(e) => {
                    Logger::event(
                        Event::ParticipantFailed,
                        &[
                            ("txn", &txn.id().to_string()),
                            ("address", &shard.address),
                            ("error", &e.to_string()),
                        ],
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn abort_everywhere(&self, txn: &Txn) -> TxnResult<()> {
        for shard in txn.participants() {
            let sent = self
                .sender
                .send(&shard.address, TxnRequest::Abort { txn: txn.id() })
                .and_then(|r| r.into_result(&shard.address));
            if let Err(e) = sent {
                Logger::event(
                    Event::ParticipantFailed,
                    &[
                        ("txn", &txn.id().to_string()),
                        ("address", &shard.address),
                        ("error", &e.to_string()),
                    ],
                );
            }
        }
        self.storage.abort(txn.id())?;
        self.metrics.increment_aborted();
        Logger::event(Event::TxnAbort, &[("txn", &txn.id().to_string())]);
        Ok(())
    }

    /// Draws a begin or read timestamp. The fence must be held shared.
    fn issue(&self) -> Timestamp {
        let floor = Timestamp::new(self.issued.load(Ordering::Acquire));
        let ts = self.clock.now().max(floor);
        self.issued.fetch_max(ts.value(), Ordering::AcqRel);
        ts
    }

    /// Draws a commit timestamp above every timestamp issued so far and no
    /// lower than `floor`, then publishes `txn`.
    fn publish(&self, txn: TxnId, floor: Option<Timestamp>) -> TxnResult<Timestamp> {
        let _fence = self.fence.write()?;
        let issued = Timestamp::new(self.issued.load(Ordering::Acquire));
        let mut commit_ts = self.clock.now().max(issued.next());
        if let Some(floor) = floor {
            commit_ts = commit_ts.max(floor);
        }
        self.issued.store(commit_ts.value(), Ordering::Release);
        self.clock.observe(commit_ts);
        self.storage.commit(txn, commit_ts)?;
        Ok(commit_ts)
    }

    /// Stops tracking `txn`. Fails if it already finished or expired.
    fn deactivate(&self, txn: TxnId) -> TxnResult<ActiveTxn> {
        self.active
            .lock()?
            .remove(&txn)
            .ok_or_else(|| TxnError::TxnNotActive { id: txn.to_string() })
    }

    fn touch(&self, txn: TxnId) -> TxnResult<()> {
        let mut active = self.active.lock()?;
        let entry = active
            .get_mut(&txn)
            .ok_or_else(|| TxnError::TxnNotActive { id: txn.to_string() })?;
        entry.last_active = Instant::now();
        Ok(())
    }

    /// Aborts transactions idle longer than the configured timeout.
    ///
    /// Prepared participants are left alone. Returns how many were aborted.
    pub fn sweep_expired(&self) -> TxnResult<usize> {
        let timeout = self.config.txn_timeout;
        let expired: Vec<TxnId> = {
            let mut active = self.active.lock()?;
            let ids: Vec<TxnId> = active
                .iter()
                .filter(|(_, a)| !a.prepared && a.last_active.elapsed() > timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                active.remove(id);
            }
            ids
        };

        for id in &expired {
            let id_str = id.to_string();
            match self.storage.abort(*id) {
                Ok(()) => Logger::event(Event::TxnExpired, &[("txn", &id_str)]),
                Err(e) => Logger::warn(
                    Event::TxnExpired.as_str(),
                    &[("txn", &id_str), ("error", &e.to_string())],
                ),
            }
        }
        self.metrics.add_expired(expired.len() as u64);
        Ok(expired.len())
    }

    /// Reclaims storage history no tracked or future transaction can read.
    ///
    /// The watermark is the oldest begin timestamp still tracked, or the
    /// highest issued timestamp when nothing is.
    pub fn collect_garbage(&self) -> TxnResult<GcStats> {
        self.ensure_running()?;
        let _fence = self.fence.write()?;
        let issued = Timestamp::new(self.issued.load(Ordering::Acquire));
        let watermark = self
            .active
            .lock()?
            .values()
            .map(|a| a.begin_ts)
            .min()
            .map_or(issued, |oldest| oldest.min(issued));

        let stats = self.storage.collect_garbage(watermark)?;
        self.collected_below
            .fetch_max(watermark.value(), Ordering::AcqRel);
        self.commits_since_gc.store(0, Ordering::Relaxed);
        self.metrics.add_collected(stats.versions as u64);
        Logger::event(
            Event::GcRun,
            &[
                ("shard", &self.shard.shard_id.to_string()),
                ("watermark", &watermark.to_string()),
                ("versions", &stats.versions.to_string()),
                ("statuses", &stats.statuses.to_string()),
            ],
        );
        Ok(stats)
    }

    /// Runs a collection once enough commits have accumulated. Failures are
    /// logged; the commit that triggered it already succeeded.
    fn collect_if_due(&self) {
        let due = self.commits_since_gc.fetch_add(1, Ordering::Relaxed) + 1;
        if due < self.config.gc_interval {
            return;
        }
        if let Err(e) = self.collect_garbage() {
            Logger::warn(
                Event::GcRun.as_str(),
                &[
                    ("shard", &self.shard.shard_id.to_string()),
                    ("error", &e.to_string()),
                ],
            );
        }
    }

    // ==================
    // Data path
    // ==================

    /// Runs `f` under a fresh view of `txn`, holding the fence shared.
    fn with_view<R>(
        &self,
        txn: TxnId,
        begin_ts: Timestamp,
        f: impl FnOnce(&ReadView) -> TxnResult<R>,
    ) -> TxnResult<R> {
        self.ensure_running()?;
        self.touch(txn)?;
        let _fence = self.fence.read()?;
        let read_ts = self
            .storage
            .isolation()
            .read_timestamp(begin_ts, self.issue());
        // A remote begin timestamp may be ahead of this shard
        self.issued.fetch_max(read_ts.value(), Ordering::AcqRel);
        f(&ReadView::new(txn, read_ts))
    }

    fn resolve_relation(&self, view: &ReadView, database: &str, relation: &str) -> TxnResult<RelationId> {
        let db = self.storage.database(view, database)?;
        Ok(self.storage.relation(view, db.id, relation)?.id)
    }

    fn note_write<R>(&self, txn: TxnId, result: TxnResult<R>) -> TxnResult<R> {
        match &result {
            Ok(_) => self.metrics.increment_writes(),
            Err(e) if e.is_conflict() => {
                self.metrics.increment_conflicts();
                Logger::event(
                    Event::WriteConflict,
                    &[("txn", &txn.to_string()), ("error", &e.to_string())],
                );
            }
            Err(_) => {}
        }
        result
    }

    /// Rows of `database.relation` matching `predicate`, as `txn` sees them.
    pub fn read(
        &self,
        txn: &Txn,
        database: &str,
        relation: &str,
        predicate: &Predicate,
    ) -> TxnResult<Vec<Row>> {
        let rows = self.with_view(txn.id(), txn.begin_ts(), |view| {
            let rel = self.resolve_relation(view, database, relation)?;
            self.storage.read(view, rel, predicate)
        })?;
        self.metrics.increment_reads();
        Ok(rows)
    }

    pub fn write(
        &self,
        txn: &Txn,
        database: &str,
        relation: &str,
        mutation: Mutation,
    ) -> TxnResult<()> {
        let result = self.with_view(txn.id(), txn.begin_ts(), |view| {
            let rel = self.resolve_relation(view, database, relation)?;
            self.storage.write(view, rel, mutation)
        });
        self.note_write(txn.id(), result)
    }

    /// Applies a write on another shard, enlisting it in `txn`.
    ///
    /// Writes addressed to this shard are applied locally.
    pub fn write_remote(
        &self,
        txn: &mut Txn,
        shard: &Shard,
        database: &str,
        relation: &str,
        mutation: Mutation,
    ) -> TxnResult<()> {
        if shard.shard_id == self.shard.shard_id {
            return self.write(txn, database, relation, mutation);
        }
        self.ensure_running()?;
        self.touch(txn.id())?;
        // Enlist first so an abort reaches the shard even if the write half-failed
        txn.enlist(shard);

        let request = TxnRequest::Write {
            txn: txn.id(),
            begin_ts: txn.begin_ts(),
            database: database.to_string(),
            relation: relation.to_string(),
            mutation,
        };
        let result = self
            .sender
            .send(&shard.address, request)
            .and_then(|r| r.into_result(&shard.address))
            .map(|_| ());
        self.note_write(txn.id(), result)
    }

    // ==================
    // Participant side
    // ==================

    /// Serves a coordination request from another shard.
    pub fn handle(&self, request: TxnRequest) -> TxnResponse {
        let result = match request {
            TxnRequest::Write {
                txn,
                begin_ts,
                database,
                relation,
                mutation,
            } => self
                .participant_write(txn, begin_ts, &database, &relation, mutation)
                .map(|_| TxnResponse::Ok),
            TxnRequest::Prepare { txn } => self.prepare(txn).map(|_| TxnResponse::Prepared),
            TxnRequest::Commit { txn, commit_ts } => self
                .participant_commit(txn, commit_ts)
                .map(|commit_ts| TxnResponse::Committed { commit_ts }),
            TxnRequest::Abort { txn } => self.participant_abort(txn).map(|_| TxnResponse::Ok),
        };
        result.unwrap_or_else(|e| TxnResponse::failed(&e))
    }

    fn participant_write(
        &self,
        txn: TxnId,
        begin_ts: Timestamp,
        database: &str,
        relation: &str,
        mutation: Mutation,
    ) -> TxnResult<()> {
        self.ensure_running()?;
        self.clock.observe(begin_ts);
        {
            // Shared fence: a collection cannot slip between the check and
            // the registration
            let _fence = self.fence.read()?;
            let mut active = self.active.lock()?;
            if !active.contains_key(&txn) {
                let watermark = self.collected_below.load(Ordering::Acquire);
                if begin_ts.value() < watermark {
                    return Err(TxnError::SnapshotTooOld {
                        begin_ts: begin_ts.value(),
                        watermark,
                    });
                }
            }
            let entry = active
                .entry(txn)
                .or_insert_with(|| ActiveTxn::new(begin_ts));
            if entry.prepared {
                return Err(TxnError::TxnNotActive { id: txn.to_string() });
            }
        }
        let result = self.with_view(txn, begin_ts, |view| {
            let rel = self.resolve_relation(view, database, relation)?;
            self.storage.write(view, rel, mutation)
        });
        self.note_write(txn, result)
    }

    fn prepare(&self, txn: TxnId) -> TxnResult<()> {
        self.ensure_running()?;
        let mut active = self.active.lock()?;
        let entry = active
            .get_mut(&txn)
            .ok_or_else(|| TxnError::TxnNotActive { id: txn.to_string() })?;
        entry.prepared = true;
        Ok(())
    }

    fn participant_commit(&self, txn: TxnId, commit_ts: Timestamp) -> TxnResult<Timestamp> {
        self.ensure_running()?;
        self.deactivate(txn)?;
        let commit_ts = self.publish(txn, Some(commit_ts))?;
        self.metrics.increment_committed();
        Logger::event(
            Event::TxnCommit,
            &[("txn", &txn.to_string()), ("commit_ts", &commit_ts.to_string())],
        );
        self.collect_if_due();
        Ok(commit_ts)
    }

    fn participant_abort(&self, txn: TxnId) -> TxnResult<()> {
        self.ensure_running()?;
        // Unknown here means it already expired or never arrived
        if self.active.lock()?.remove(&txn).is_none() {
            return Ok(());
        }
        self.storage.abort(txn)?;
        self.metrics.increment_aborted();
        Logger::event(Event::TxnAbort, &[("txn", &txn.to_string())]);
        Ok(())
    }

    // ==================
    // Catalog
    // ==================

    pub fn create_database(&self, txn: &Txn, name: &str) -> TxnResult<DatabaseId> {
        let result = self.with_view(txn.id(), txn.begin_ts(), |view| {
            self.storage.create_database(view, name)
        });
        self.note_write(txn.id(), result)
    }

    pub fn drop_database(&self, txn: &Txn, name: &str) -> TxnResult<()> {
        let result = self.with_view(txn.id(), txn.begin_ts(), |view| {
            self.storage.drop_database(view, name)
        });
        self.note_write(txn.id(), result)
    }

    pub fn database(&self, txn: &Txn, name: &str) -> TxnResult<Database> {
        self.with_view(txn.id(), txn.begin_ts(), |view| self.storage.database(view, name))
    }

    pub fn database_names(&self, txn: &Txn) -> TxnResult<Vec<String>> {
        self.with_view(txn.id(), txn.begin_ts(), |view| {
            self.storage.database_names(view)
        })
    }

    pub fn create_relation(
        &self,
        txn: &Txn,
        database: &str,
        def: RelationDef,
    ) -> TxnResult<RelationId> {
        let result = self.with_view(txn.id(), txn.begin_ts(), |view| {
            let db = self.storage.database(view, database)?;
            self.storage.create_relation(view, db.id, def)
        });
        self.note_write(txn.id(), result)
    }

    pub fn drop_relation(&self, txn: &Txn, database: &str, name: &str) -> TxnResult<()> {
        let result = self.with_view(txn.id(), txn.begin_ts(), |view| {
            let db = self.storage.database(view, database)?;
            self.storage.drop_relation(view, db.id, name)
        });
        self.note_write(txn.id(), result)
    }

    pub fn relation(&self, txn: &Txn, database: &str, name: &str) -> TxnResult<Relation> {
        self.with_view(txn.id(), txn.begin_ts(), |view| {
            let db = self.storage.database(view, database)?;
            self.storage.relation(view, db.id, name)
        })
    }

    pub fn relation_names(&self, txn: &Txn, database: &str) -> TxnResult<Vec<String>> {
        self.with_view(txn.id(), txn.begin_ts(), |view| {
            let db = self.storage.database(view, database)?;
            self.storage.relation_names(view, db.id)
        })
    }

    /// Table definitions of a relation, looked up by name in one view.
    pub fn table_defs(&self, txn: &Txn, database: &str, name: &str) -> TxnResult<Vec<TableDef>> {
        self.with_view(txn.id(), txn.begin_ts(), |view| {
            let rel = self.resolve_relation(view, database, name)?;
            self.storage.table_defs(view, rel)
        })
    }

    // ==================
    // Iterators
    // ==================

    pub fn open_iter(
        &self,
        txn: &Txn,
        database: &str,
        relation: &str,
        predicate: &Predicate,
    ) -> TxnResult<IterId> {
        let iter = self.with_view(txn.id(), txn.begin_ts(), |view| {
            let rel = self.resolve_relation(view, database, relation)?;
            self.storage.new_iter(view, rel, predicate)
        })?;
        self.metrics.increment_reads();
        Ok(iter)
    }

    /// Next batch of at most `max` rows, capped by the configured batch size.
    /// An empty batch means the iterator is drained.
    pub fn next_batch(&self, txn: &Txn, iter: IterId, max: usize) -> TxnResult<Vec<Row>> {
        self.ensure_running()?;
        self.touch(txn.id())?;
        self.storage
            .iter_next(iter, max.min(self.config.max_batch_rows))
    }

    pub fn close_iter(&self, txn: &Txn, iter: IterId) -> TxnResult<()> {
        self.ensure_running()?;
        self.touch(txn.id())?;
        self.storage.close_iter(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, TypeDesc};
    use crate::mvcc::MonotonicClock;
    use crate::row;
    use crate::service::NoopSender;
    use crate::storage::MemHandler;
    use std::time::Duration;

    fn service(config: ServiceConfig) -> ShardTxnService {
        let svc = ShardTxnService::new(
            Shard::new(1),
            Arc::new(MemHandler::default()),
            Arc::new(NoopSender),
            Arc::new(MonotonicClock::logical()),
            config,
        )
        .unwrap();
        svc.start().unwrap();
        svc
    }

    fn session() -> SessionContext {
        SessionContext::new("db1")
    }

    fn setup(svc: &ShardTxnService) {
        let txn = svc.begin(session()).unwrap();
        svc.create_database(&txn, "db1").unwrap();
        let def = RelationDef::new("t1")
            .attribute(AttributeDef::new("id", TypeDesc::int64()).primary())
            .attribute(AttributeDef::new("v", TypeDesc::varchar(10)));
        svc.create_relation(&txn, "db1", def).unwrap();
        svc.commit(txn).unwrap();
    }

    #[test]
    fn test_calls_before_start_unavailable() {
        let svc = ShardTxnService::new(
            Shard::new(1),
            Arc::new(MemHandler::default()),
            Arc::new(NoopSender),
            Arc::new(MonotonicClock::logical()),
            ServiceConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            svc.begin(session()),
            Err(TxnError::ServiceUnavailable { shard: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ShardTxnService::new(
            Shard::new(1),
            Arc::new(MemHandler::default()),
            Arc::new(NoopSender),
            Arc::new(MonotonicClock::logical()),
            ServiceConfig::new().with_max_batch_rows(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_commit_is_monotonic_after_begin() {
        let svc = service(ServiceConfig::default());
        let txn = svc.begin(session()).unwrap();
        let begin = txn.begin_ts();
        let commit = svc.commit(txn).unwrap();
        assert!(commit > begin);
    }

    #[test]
    fn test_finished_txn_rejected() {
        let svc = service(ServiceConfig::default());
        setup(&svc);
        let txn = svc.begin(session()).unwrap();
        let id = txn.id();
        svc.abort(txn).unwrap();

        // A fresh handle with the same id is not tracked anymore
        let ghost = Txn::new(id, Timestamp::new(1), session());
        assert!(matches!(
            svc.read(&ghost, "db1", "t1", &Predicate::All),
            Err(TxnError::TxnNotActive { .. })
        ));
    }

    #[test]
    fn test_sweep_aborts_idle_transactions() {
        let svc = service(ServiceConfig::new().with_txn_timeout(Duration::from_millis(20)));
        setup(&svc);
        let txn = svc.begin(session()).unwrap();
        svc.write(&txn, "db1", "t1", Mutation::Insert(row![1i64, "a"]))
            .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(svc.sweep_expired().unwrap(), 1);
        assert_eq!(svc.metrics().expired, 1);
        assert!(matches!(svc.commit(txn), Err(TxnError::TxnNotActive { .. })));

        // The expired write left nothing behind
        let reader = svc.begin(session()).unwrap();
        assert!(svc
            .read(&reader, "db1", "t1", &Predicate::All)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stop_aborts_active() {
        let svc = service(ServiceConfig::default());
        let _txn = svc.begin(session()).unwrap();
        svc.stop().unwrap();
        assert_eq!(svc.active_count().unwrap(), 0);
        assert_eq!(svc.state().unwrap(), ServiceState::Stopped);
        assert!(matches!(
            svc.begin(session()),
            Err(TxnError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_batches_capped_by_config() {
        let svc = service(ServiceConfig::new().with_max_batch_rows(2));
        setup(&svc);
        let txn = svc.begin(session()).unwrap();
        for i in 0..5i64 {
            svc.write(&txn, "db1", "t1", Mutation::Insert(row![i, "x"]))
                .unwrap();
        }
        let iter = svc.open_iter(&txn, "db1", "t1", &Predicate::All).unwrap();
        assert_eq!(svc.next_batch(&txn, iter, 100).unwrap().len(), 2);
        svc.close_iter(&txn, iter).unwrap();
    }

    #[test]
    fn test_remote_write_without_transport_fails() {
        let svc = service(ServiceConfig::default());
        let mut txn = svc.begin(session()).unwrap();
        let err = svc
            .write_remote(&mut txn, &Shard::new(2), "db1", "t1", Mutation::Delete(vec![]))
            .unwrap_err();
        assert!(matches!(err, TxnError::Remote { .. }));
        assert_eq!(txn.participants().len(), 1);

        // Abort still succeeds even though the participant is unreachable
        svc.abort(txn).unwrap();
    }

    #[test]
    fn test_handle_prepare_unknown_txn() {
        let svc = service(ServiceConfig::default());
        let response = svc.handle(TxnRequest::Prepare { txn: TxnId::new() });
        assert!(matches!(response, TxnResponse::Failed { code, .. } if code == "TXN_NOT_ACTIVE"));
    }
}
