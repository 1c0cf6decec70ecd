//! In-memory storage handler
//!
//! Lock order: catalog → tables → table → statuses → write sets. Commit and
//! abort take the status table alone first and release it before touching
//! anything else.
//!
//! History is reclaimed by `collect_garbage`: versions ended by a writer
//! committed at or below the watermark are dropped, surviving versions of
//! such writers are frozen, and statuses nothing refers to are forgotten.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::catalog::{
    AttributeDef, Database, DatabaseId, Relation, RelationDef, RelationId, Row, TableDef,
};
use crate::mvcc::{
    IsolationPolicy, ReadCommitted, ReadView, StatusTable, Timestamp, Version, VersionChain,
    Visibility,
};
use crate::txn::{TxnError, TxnId, TxnResult};

use super::table::TableData;
use super::{GcStats, IterId, Mutation, Predicate, StorageHandler};

#[derive(Debug)]
struct RelationEntry {
    id: RelationId,
    database_id: DatabaseId,
    name: String,
    defs: Vec<TableDef>,
}

#[derive(Debug, Default)]
struct Catalog {
    databases: HashMap<String, VersionChain<DatabaseId>>,
    database_keys: HashMap<DatabaseId, String>,
    relations: HashMap<(DatabaseId, String), VersionChain<Arc<RelationEntry>>>,
    relation_keys: HashMap<RelationId, (DatabaseId, String)>,
}

impl Catalog {
    fn visible_database(&self, vis: &Visibility<'_>, id: DatabaseId) -> TxnResult<&str> {
        let not_found = || TxnError::DatabaseNotFound {
            id: id.to_string(),
            name: String::new(),
        };
        let name = self.database_keys.get(&id).ok_or_else(not_found)?;
        self.databases
            .get(name)
            .and_then(|chain| chain.visible(vis))
            .filter(|v| *v.payload() == id)
            .map(|_| name.as_str())
            .ok_or_else(not_found)
    }

    fn visible_relation(
        &self,
        vis: &Visibility<'_>,
        id: RelationId,
    ) -> TxnResult<Arc<RelationEntry>> {
        let (database_id, name) =
            self.relation_keys
                .get(&id)
                .ok_or_else(|| TxnError::RelationNotFound {
                    id: id.to_string(),
                    name: String::new(),
                })?;
        self.visible_database(vis, *database_id)?;
        self.relations
            .get(&(*database_id, name.clone()))
            .and_then(|chain| chain.visible(vis))
            .map(|v| v.payload())
            .filter(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| TxnError::RelationNotFound {
                id: id.to_string(),
                name: name.clone(),
            })
    }
}

/// Keys touched by one transaction, for rollback.
#[derive(Debug, Default)]
struct WriteSet {
    rows: HashMap<RelationId, HashSet<String>>,
    databases: HashSet<String>,
    relations: HashSet<(DatabaseId, String)>,
}

#[derive(Debug)]
struct TableIter {
    owner: TxnId,
    rows: VecDeque<Row>,
}

/// Storage handler keeping everything in process memory.
pub struct MemHandler {
    policy: Arc<dyn IsolationPolicy>,
    statuses: RwLock<StatusTable>,
    catalog: RwLock<Catalog>,
    tables: RwLock<HashMap<RelationId, Arc<RwLock<TableData>>>>,
    iters: Mutex<HashMap<IterId, TableIter>>,
    write_sets: Mutex<HashMap<TxnId, WriteSet>>,
    next_id: AtomicU64,
}

impl MemHandler {
    pub fn new(policy: impl IsolationPolicy + 'static) -> Self {
        Self::with_policy(Arc::new(policy))
    }

    pub fn with_policy(policy: Arc<dyn IsolationPolicy>) -> Self {
        Self {
            policy,
            statuses: RwLock::new(StatusTable::new()),
            catalog: RwLock::new(Catalog::default()),
            tables: RwLock::new(HashMap::new()),
            iters: Mutex::new(HashMap::new()),
            write_sets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn check_writer(statuses: &StatusTable, txn: TxnId) -> TxnResult<()> {
        if statuses.is_active(txn) {
            Ok(())
        } else {
            Err(TxnError::TxnNotActive {
                id: txn.to_string(),
            })
        }
    }

    /// Rejects a write over `chain` held by another writer or, depending on
    /// the policy, committed after the view.
    fn check_conflict<T>(
        vis: &Visibility<'_>,
        chain: &VersionChain<T>,
        relation: &str,
        key: &str,
    ) -> TxnResult<()> {
        let conflict = |holder: String| TxnError::WriteConflict {
            relation: relation.to_string(),
            key: key.to_string(),
            holder,
        };
        if let Some(holder) = chain.foreign_intent(vis) {
            return Err(conflict(holder.to_string()));
        }
        if let Some(latest) = chain.latest_commit(vis) {
            if vis.policy().write_conflicts(latest, &vis.view()) {
                return Err(conflict(format!("committed@{}", latest)));
            }
        }
        Ok(())
    }

    fn record(&self, txn: TxnId, f: impl FnOnce(&mut WriteSet)) -> TxnResult<()> {
        let mut write_sets = self.write_sets.lock()?;
        f(write_sets.entry(txn).or_default());
        Ok(())
    }

    fn live_relation(&self, view: &ReadView, id: RelationId) -> TxnResult<Arc<RelationEntry>> {
        let catalog = self.catalog.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        catalog.visible_relation(&vis, id)
    }

    fn table(&self, id: RelationId) -> TxnResult<Arc<RwLock<TableData>>> {
        self.tables
            .read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| TxnError::RelationNotFound {
                id: id.to_string(),
                name: String::new(),
            })
    }

    fn rollback(&self, txn: TxnId, write_set: WriteSet) -> TxnResult<()> {
        if !write_set.databases.is_empty() || !write_set.relations.is_empty() {
            let mut guard = self.catalog.write()?;
            let catalog = &mut *guard;
            for name in &write_set.databases {
                if let Some(chain) = catalog.databases.get_mut(name) {
                    for version in chain.versions().iter().filter(|v| v.created_by() == txn) {
                        catalog.database_keys.remove(version.payload());
                    }
                    chain.rollback(txn);
                    if chain.is_empty() {
                        catalog.databases.remove(name);
                    }
                }
            }
            let mut dropped_tables = Vec::new();
            for key in &write_set.relations {
                if let Some(chain) = catalog.relations.get_mut(key) {
                    for version in chain.versions().iter().filter(|v| v.created_by() == txn) {
                        catalog.relation_keys.remove(&version.payload().id);
                        dropped_tables.push(version.payload().id);
                    }
                    chain.rollback(txn);
                    if chain.is_empty() {
                        catalog.relations.remove(key);
                    }
                }
            }
            let mut tables = self.tables.write()?;
            for id in dropped_tables {
                tables.remove(&id);
            }
        }

        for (relation, keys) in &write_set.rows {
            // The relation may have been created by this same transaction
            if let Ok(table) = self.table(*relation) {
                table.write()?.rollback(txn, keys.iter());
            }
        }
        Ok(())
    }
}

impl Default for MemHandler {
    fn default() -> Self {
        Self::new(ReadCommitted)
    }
}

impl StorageHandler for MemHandler {
    fn isolation(&self) -> &dyn IsolationPolicy {
        self.policy.as_ref()
    }

    fn create_database(&self, view: &ReadView, name: &str) -> TxnResult<DatabaseId> {
        let mut guard = self.catalog.write()?;
        let catalog = &mut *guard;
        let statuses = self.statuses.read()?;
        Self::check_writer(&statuses, view.txn())?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);

        // A name is taken while another transaction is creating or dropping it
        if let Some(chain) = catalog.databases.get(name) {
            if chain.foreign_intent(&vis).is_some() || chain.visible(&vis).is_some() {
                return Err(TxnError::Existed);
            }
        }

        let id = DatabaseId(self.next_id());
        catalog
            .databases
            .entry(name.to_string())
            .or_default()
            .push(Version::new(id, view.txn()));
        catalog.database_keys.insert(id, name.to_string());
        self.record(view.txn(), |ws| {
            ws.databases.insert(name.to_string());
        })?;
        Ok(id)
    }

    fn drop_database(&self, view: &ReadView, name: &str) -> TxnResult<()> {
        let mut catalog = self.catalog.write()?;
        let statuses = self.statuses.read()?;
        Self::check_writer(&statuses, view.txn())?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);

        let chain = catalog
            .databases
            .get_mut(name)
            .ok_or_else(|| TxnError::database_not_found(name))?;
        let index = chain
            .visible_index(&vis)
            .ok_or_else(|| TxnError::database_not_found(name))?;
        Self::check_conflict(&vis, chain, "", name)?;
        if let Some(version) = chain.get_mut(index) {
            version.mark_deleted(view.txn());
        }
        self.record(view.txn(), |ws| {
            ws.databases.insert(name.to_string());
        })
    }

    fn database(&self, view: &ReadView, name: &str) -> TxnResult<Database> {
        let catalog = self.catalog.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);

        catalog
            .databases
            .get(name)
            .and_then(|chain| chain.visible(&vis))
            .map(|v| Database {
                id: *v.payload(),
                name: name.to_string(),
            })
            .ok_or_else(|| TxnError::database_not_found(name))
    }

    fn database_names(&self, view: &ReadView) -> TxnResult<Vec<String>> {
        let catalog = self.catalog.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);

        let mut names: Vec<String> = catalog
            .databases
            .iter()
            .filter(|(_, chain)| chain.visible(&vis).is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_relation(
        &self,
        view: &ReadView,
        database: DatabaseId,
        def: RelationDef,
    ) -> TxnResult<RelationId> {
        let mut guard = self.catalog.write()?;
        let catalog = &mut *guard;
        let statuses = self.statuses.read()?;
        Self::check_writer(&statuses, view.txn())?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        catalog.visible_database(&vis, database)?;

        let attrs: Vec<AttributeDef> = def.attributes().cloned().collect();
        let mut seen = HashSet::new();
        if !attrs.iter().all(|a| seen.insert(a.name.as_str())) {
            return Err(TxnError::Existed);
        }

        let key = (database, def.name.clone());
        if let Some(chain) = catalog.relations.get(&key) {
            if chain.foreign_intent(&vis).is_some() || chain.visible(&vis).is_some() {
                return Err(TxnError::Existed);
            }
        }

        let id = RelationId(self.next_id());
        let entry = RelationEntry {
            id,
            database_id: database,
            name: def.name.clone(),
            defs: def.defs,
        };
        catalog
            .relations
            .entry(key.clone())
            .or_default()
            .push(Version::new(Arc::new(entry), view.txn()));
        catalog.relation_keys.insert(id, key.clone());
        self.tables.write()?.insert(
            id,
            Arc::new(RwLock::new(TableData::new(id, def.name, attrs))),
        );
        self.record(view.txn(), |ws| {
            ws.relations.insert(key);
        })?;
        Ok(id)
    }

    fn drop_relation(&self, view: &ReadView, database: DatabaseId, name: &str) -> TxnResult<()> {
        let mut guard = self.catalog.write()?;
        let catalog = &mut *guard;
        let statuses = self.statuses.read()?;
        Self::check_writer(&statuses, view.txn())?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        let db_name = catalog.visible_database(&vis, database)?.to_string();

        let key = (database, name.to_string());
        let chain = catalog
            .relations
            .get_mut(&key)
            .ok_or_else(|| TxnError::relation_not_found(name))?;
        let index = chain
            .visible_index(&vis)
            .ok_or_else(|| TxnError::relation_not_found(name))?;
        Self::check_conflict(&vis, chain, &db_name, name)?;
        if let Some(version) = chain.get_mut(index) {
            version.mark_deleted(view.txn());
        }
        self.record(view.txn(), |ws| {
            ws.relations.insert(key);
        })
    }

    fn relation(&self, view: &ReadView, database: DatabaseId, name: &str) -> TxnResult<Relation> {
        let catalog = self.catalog.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        catalog.visible_database(&vis, database)?;

        catalog
            .relations
            .get(&(database, name.to_string()))
            .and_then(|chain| chain.visible(&vis))
            .map(|v| Relation {
                id: v.payload().id,
                database_id: v.payload().database_id,
                name: v.payload().name.clone(),
            })
            .ok_or_else(|| TxnError::relation_not_found(name))
    }

    fn relation_names(&self, view: &ReadView, database: DatabaseId) -> TxnResult<Vec<String>> {
        let catalog = self.catalog.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        catalog.visible_database(&vis, database)?;

        let mut names: Vec<String> = catalog
            .relations
            .iter()
            .filter(|((db, _), chain)| *db == database && chain.visible(&vis).is_some())
            .map(|((_, name), _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn table_defs(&self, view: &ReadView, relation: RelationId) -> TxnResult<Vec<TableDef>> {
        Ok(self.live_relation(view, relation)?.defs.clone())
    }

    fn attribute(
        &self,
        view: &ReadView,
        relation: RelationId,
        name: &str,
    ) -> TxnResult<AttributeDef> {
        self.live_relation(view, relation)?
            .defs
            .iter()
            .filter_map(TableDef::as_attribute)
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| TxnError::DefNotFound {
                id: relation.to_string(),
                name: name.to_string(),
            })
    }

    fn read(
        &self,
        view: &ReadView,
        relation: RelationId,
        predicate: &Predicate,
    ) -> TxnResult<Vec<Row>> {
        self.live_relation(view, relation)?;
        let table = self.table(relation)?;
        let table = table.read()?;
        let statuses = self.statuses.read()?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        table.scan(&vis, predicate)
    }

    fn write(&self, view: &ReadView, relation: RelationId, mutation: Mutation) -> TxnResult<()> {
        self.live_relation(view, relation)?;
        let table = self.table(relation)?;
        let mut table = table.write()?;
        let statuses = self.statuses.read()?;
        Self::check_writer(&statuses, view.txn())?;
        let vis = Visibility::new(self.policy.as_ref(), &statuses, *view);
        let me = view.txn();
        let name = table.name().to_string();
        let keyless = || TxnError::DefNotFound {
            id: relation.to_string(),
            name: "primary key".into(),
        };

        let key = match mutation {
            Mutation::Insert(row) => {
                let row = table.normalize(row)?;
                let key = if table.has_key() {
                    table.row_key(&row)?
                } else {
                    format!("#{}", self.next_id())
                };
                if let Some(chain) = table.chain(&key) {
                    Self::check_conflict(&vis, chain, &name, &key)?;
                    if chain.visible(&vis).is_some() {
                        return Err(TxnError::Existed);
                    }
                }
                table.chain_entry(key.clone()).push(Version::new(row, me));
                key
            }
            Mutation::Upsert(row) => {
                if !table.has_key() {
                    return Err(keyless());
                }
                let row = table.normalize(row)?;
                let key = table.row_key(&row)?;
                if let Some(chain) = table.chain(&key) {
                    Self::check_conflict(&vis, chain, &name, &key)?;
                }
                let chain = table.chain_entry(key.clone());
                if let Some(index) = chain.visible_index(&vis) {
                    if let Some(version) = chain.get_mut(index) {
                        version.mark_deleted(me);
                    }
                }
                chain.push(Version::new(row, me));
                key
            }
            Mutation::Delete(values) => {
                if !table.has_key() {
                    return Err(keyless());
                }
                let key = table.encode_key(&values)?;
                let Some(chain) = table.chain_mut(&key) else {
                    return Ok(());
                };
                Self::check_conflict(&vis, chain, &name, &key)?;
                let Some(index) = chain.visible_index(&vis) else {
                    return Ok(());
                };
                if let Some(version) = chain.get_mut(index) {
                    version.mark_deleted(me);
                }
                key
            }
        };

        self.record(me, |ws| {
            ws.rows.entry(relation).or_default().insert(key);
        })
    }

    fn new_iter(
        &self,
        view: &ReadView,
        relation: RelationId,
        predicate: &Predicate,
    ) -> TxnResult<IterId> {
        let rows = self.read(view, relation, predicate)?;
        let id = IterId(self.next_id());
        self.iters.lock()?.insert(
            id,
            TableIter {
                owner: view.txn(),
                rows: rows.into(),
            },
        );
        Ok(id)
    }

    fn iter_next(&self, iter: IterId, max: usize) -> TxnResult<Vec<Row>> {
        let mut iters = self.iters.lock()?;
        let state = iters.get_mut(&iter).ok_or_else(|| TxnError::IterNotFound {
            id: iter.to_string(),
        })?;
        let n = max.min(state.rows.len());
        Ok(state.rows.drain(..n).collect())
    }

    fn close_iter(&self, iter: IterId) -> TxnResult<()> {
        self.iters
            .lock()?
            .remove(&iter)
            .map(|_| ())
            .ok_or_else(|| TxnError::IterNotFound {
                id: iter.to_string(),
            })
    }

    fn commit(&self, txn: TxnId, commit_ts: Timestamp) -> TxnResult<()> {
        self.statuses.write()?.commit(txn, commit_ts)?;
        self.write_sets.lock()?.remove(&txn);
        self.iters.lock()?.retain(|_, it| it.owner != txn);
        Ok(())
    }

    fn abort(&self, txn: TxnId) -> TxnResult<()> {
        self.statuses.write()?.abort(txn)?;
        let write_set = self.write_sets.lock()?.remove(&txn);
        self.iters.lock()?.retain(|_, it| it.owner != txn);
        match write_set {
            Some(write_set) => self.rollback(txn, write_set),
            None => Ok(()),
        }
    }

    fn collect_garbage(&self, watermark: Timestamp) -> TxnResult<GcStats> {
        let mut guard = self.catalog.write()?;
        let catalog = &mut *guard;
        let mut tables = self.tables.write()?;
        let mut referenced = HashSet::new();
        let mut versions = 0;

        {
            let statuses = self.statuses.read()?;
            let settled = |txn: TxnId| statuses.is_settled(txn, watermark);
            let Catalog {
                databases,
                database_keys,
                relations,
                relation_keys,
            } = catalog;

            databases.retain(|_, chain| {
                for gone in chain.prune(&settled) {
                    database_keys.remove(gone.payload());
                    versions += 1;
                }
                referenced.extend(chain.writers());
                !chain.is_empty()
            });

            let mut dead = Vec::new();
            relations.retain(|(database, _), chain| {
                // Relations of a reclaimed database are unreachable
                let gone: Vec<RelationId> = if database_keys.contains_key(database) {
                    chain.prune(&settled).iter().map(|v| v.payload().id).collect()
                } else {
                    let ids = chain.versions().iter().map(|v| v.payload().id).collect();
                    *chain = VersionChain::new();
                    ids
                };
                versions += gone.len();
                dead.extend(gone);
                referenced.extend(chain.writers());
                !chain.is_empty()
            });
            for id in dead {
                relation_keys.remove(&id);
                tables.remove(&id);
            }
        }

        for table in tables.values() {
            let mut table = table.write()?;
            let statuses = self.statuses.read()?;
            versions += table.prune(|txn| statuses.is_settled(txn, watermark), &mut referenced);
        }

        let statuses = self.statuses.write()?.retain_referenced(&referenced);
        Ok(GcStats { versions, statuses })
    }
}
