//! Storage handlers
//!
//! A `StorageHandler` keeps databases, relations and rows, answers reads
//! filtered by its isolation policy and applies writes attributed to a
//! transaction. Every mutation, catalog changes included, is stamped with
//! exactly one writer and stays invisible to others until that writer's
//! commit is published.

mod mem;
mod table;

pub use mem::MemHandler;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{
    AttributeDef, Database, DatabaseId, Relation, RelationDef, RelationId, Row, TableDef, Value,
};
use crate::mvcc::{IsolationPolicy, ReadView, Timestamp};
use crate::txn::{TxnError, TxnId, TxnResult};

/// Identity of an open table iterator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct IterId(pub u64);

impl fmt::Display for IterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row filter evaluated inside storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Every row
    All,
    /// Rows whose primary key equals the given values
    Key(Vec<Value>),
    /// Rows where `column` equals `value`
    Eq { column: String, value: Value },
    /// Conjunction
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Key lookup values, if this is a point lookup.
    pub(crate) fn key(&self) -> Option<&[Value]> {
        match self {
            Predicate::Key(values) => Some(values),
            _ => None,
        }
    }

    /// Resolves column names to ordinals.
    pub(crate) fn bind(&self, attrs: &[AttributeDef]) -> TxnResult<BoundPredicate> {
        Ok(match self {
            Predicate::All | Predicate::Key(_) => BoundPredicate::All,
            Predicate::Eq { column, value } => {
                let index = attrs
                    .iter()
                    .position(|a| &a.name == column)
                    .ok_or_else(|| TxnError::column_not_found(column))?;
                BoundPredicate::Eq(index, value.clone())
            }
            Predicate::And(parts) => BoundPredicate::And(
                parts
                    .iter()
                    .map(|p| p.bind(attrs))
                    .collect::<TxnResult<Vec<_>>>()?,
            ),
        })
    }
}

/// A predicate with columns resolved to ordinals.
#[derive(Debug, Clone)]
pub(crate) enum BoundPredicate {
    All,
    Eq(usize, Value),
    And(Vec<BoundPredicate>),
}

impl BoundPredicate {
    pub(crate) fn matches(&self, row: &Row) -> bool {
        match self {
            BoundPredicate::All => true,
            BoundPredicate::Eq(index, value) => row.get(*index) == Some(value),
            BoundPredicate::And(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Adds a row. Fails with `Existed` if its key is already live.
    Insert(Row),
    /// Replaces the row with the same key, inserting it if absent.
    Upsert(Row),
    /// Removes the row with the given key values. Absent keys are ignored.
    Delete(Vec<Value>),
}

/// Outcome of one garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcStats {
    /// Row and catalog versions removed
    pub versions: usize,
    /// Transaction status entries forgotten
    pub statuses: usize,
}

/// Pluggable storage backend.
///
/// All methods take a `ReadView`: the acting transaction plus the read
/// timestamp its isolation policy chose for this call.
pub trait StorageHandler: Send + Sync {
    /// Prepares the backend. A failure here is fatal for the owning service.
    fn start(&self) -> TxnResult<()> {
        Ok(())
    }

    /// The isolation policy fixed for this instance.
    fn isolation(&self) -> &dyn IsolationPolicy;

    // Catalog

    fn create_database(&self, view: &ReadView, name: &str) -> TxnResult<DatabaseId>;

    fn drop_database(&self, view: &ReadView, name: &str) -> TxnResult<()>;

    fn database(&self, view: &ReadView, name: &str) -> TxnResult<Database>;

    /// Names of all visible databases, sorted.
    fn database_names(&self, view: &ReadView) -> TxnResult<Vec<String>>;

    fn create_relation(
        &self,
        view: &ReadView,
        database: DatabaseId,
        def: RelationDef,
    ) -> TxnResult<RelationId>;

    fn drop_relation(&self, view: &ReadView, database: DatabaseId, name: &str) -> TxnResult<()>;

    fn relation(&self, view: &ReadView, database: DatabaseId, name: &str) -> TxnResult<Relation>;

    /// Names of all visible relations of a database, sorted.
    fn relation_names(&self, view: &ReadView, database: DatabaseId) -> TxnResult<Vec<String>>;

    /// Table definitions in declaration order.
    fn table_defs(&self, view: &ReadView, relation: RelationId) -> TxnResult<Vec<TableDef>>;

    /// Looks up one attribute by name.
    fn attribute(&self, view: &ReadView, relation: RelationId, name: &str)
        -> TxnResult<AttributeDef>;

    // Data

    fn read(&self, view: &ReadView, relation: RelationId, predicate: &Predicate)
        -> TxnResult<Vec<Row>>;

    fn write(&self, view: &ReadView, relation: RelationId, mutation: Mutation) -> TxnResult<()>;

    /// Opens an iterator over the rows matching `predicate` as of `view`.
    fn new_iter(&self, view: &ReadView, relation: RelationId, predicate: &Predicate)
        -> TxnResult<IterId>;

    /// Returns up to `max` rows. An empty batch means the iterator is drained.
    fn iter_next(&self, iter: IterId, max: usize) -> TxnResult<Vec<Row>>;

    fn close_iter(&self, iter: IterId) -> TxnResult<()>;

    // Finalization

    /// Publishes every effect of `txn` at `commit_ts`, all or nothing.
    fn commit(&self, txn: TxnId, commit_ts: Timestamp) -> TxnResult<()>;

    /// Discards every effect of `txn`.
    fn abort(&self, txn: TxnId) -> TxnResult<()>;

    /// Reclaims history no view at or above `watermark` can observe.
    ///
    /// The caller guarantees every current and future view reads at or
    /// above `watermark`. Backends without history keep the default.
    fn collect_garbage(&self, _watermark: Timestamp) -> TxnResult<GcStats> {
        Ok(GcStats::default())
    }
}
