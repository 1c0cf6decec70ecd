//! Compiler-facing metadata resolution
//!
//! `Execution` answers schema questions for one statement inside one active
//! transaction. It only reads.

use crate::catalog::{AttributeDef, TableDef, Value};
use crate::service::ShardTxnService;
use crate::storage::Predicate;
use crate::txn::{Txn, TxnResult};

use super::{ColDef, Cost, ObjectRef, PlanTableDef, ResolveError, ResolveResult, StatementKind};

/// What a query compiler needs to know about the schema.
pub trait CompilerContext {
    /// True if `name` resolves to a database. Lookup failures count as absent.
    fn database_exists(&self, name: &str) -> bool;

    fn default_database(&self) -> String;

    /// Resolves `schema.table`. An empty schema means the default database.
    ///
    /// A missing database or relation yields `Ok(None)`; any other failure
    /// is returned.
    fn resolve(&self, schema: &str, table: &str)
        -> ResolveResult<Option<(ObjectRef, PlanTableDef)>>;

    /// Primary key columns in ordinal order.
    fn get_primary_key_def(&self, db: &str, table: &str) -> ResolveResult<Vec<ColDef>>;

    /// The first hidden column, if any.
    fn get_hide_key_def(&self, db: &str, table: &str) -> ResolveResult<Option<ColDef>>;

    fn cost(&self, obj: &ObjectRef, filter: Option<&Predicate>) -> Cost;

    fn resolve_variable(&self, name: &str, is_system: bool, is_global: bool)
        -> ResolveResult<Value>;

    fn get_root_sql(&self) -> String;
}

/// Resolution context of one statement.
pub struct Execution<'a> {
    service: &'a ShardTxnService,
    txn: &'a Txn,
    stmt: StatementKind,
}

impl<'a> Execution<'a> {
    pub fn new(service: &'a ShardTxnService, txn: &'a Txn, stmt: StatementKind) -> Self {
        Self { service, txn, stmt }
    }

    pub fn statement(&self) -> StatementKind {
        self.stmt
    }

    fn attributes(&self, db: &str, table: &str) -> TxnResult<Vec<AttributeDef>> {
        Ok(self
            .service
            .table_defs(self.txn, db, table)?
            .iter()
            .filter_map(TableDef::as_attribute)
            .cloned()
            .collect())
    }
}

impl CompilerContext for Execution<'_> {
    fn database_exists(&self, name: &str) -> bool {
        self.service.database(self.txn, name).is_ok()
    }

    fn default_database(&self) -> String {
        self.txn.session().current_db.clone()
    }

    fn resolve(
        &self,
        schema: &str,
        table: &str,
    ) -> ResolveResult<Option<(ObjectRef, PlanTableDef)>> {
        let schema = if schema.is_empty() {
            self.txn.session().current_db.as_str()
        } else {
            schema
        };

        let attrs = match self.attributes(schema, table) {
            Ok(attrs) => attrs,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let with_hidden = self.stmt.includes_hidden_columns();
        let cols = attrs
            .iter()
            .enumerate()
            .filter(|(_, attr)| with_hidden || !attr.hidden)
            .map(|(i, attr)| ColDef::from_attribute(i, attr))
            .collect();

        Ok(Some((
            ObjectRef {
                schema_name: schema.to_string(),
                obj_name: table.to_string(),
            },
            PlanTableDef {
                name: table.to_string(),
                cols,
            },
        )))
    }

    fn get_primary_key_def(&self, db: &str, table: &str) -> ResolveResult<Vec<ColDef>> {
        Ok(self
            .attributes(db, table)?
            .iter()
            .enumerate()
            .filter(|(_, attr)| attr.primary)
            .map(|(i, attr)| ColDef::from_attribute(i, attr))
            .collect())
    }

    fn get_hide_key_def(&self, db: &str, table: &str) -> ResolveResult<Option<ColDef>> {
        Ok(self
            .attributes(db, table)?
            .iter()
            .enumerate()
            .find(|(_, attr)| attr.hidden)
            .map(|(i, attr)| ColDef::from_attribute(i, attr)))
    }

    fn cost(&self, _obj: &ObjectRef, _filter: Option<&Predicate>) -> Cost {
        Cost::default()
    }

    fn resolve_variable(
        &self,
        name: &str,
        _is_system: bool,
        _is_global: bool,
    ) -> ResolveResult<Value> {
        Err(ResolveError::unimplemented(format!("variable {}", name)))
    }

    fn get_root_sql(&self) -> String {
        String::new()
    }
}
