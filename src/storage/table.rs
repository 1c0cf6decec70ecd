//! Row storage for a single relation
//!
//! Rows live in version chains keyed by an encoded primary key. Relations
//! without a declared primary key fall back to their hidden columns; if
//! they have neither, inserts get a generated key and rows can only be
//! reached by scanning.
//!
//! Hidden columns hold row ids assigned here. A row may omit them entirely
//! or leave them NULL.

use std::collections::{BTreeMap, HashSet};

use crate::catalog::{AttributeDef, RelationId, Row, TypeOid, Value};
use crate::mvcc::{VersionChain, Visibility};
use crate::txn::{TxnError, TxnId, TxnResult};

use super::Predicate;

/// Versioned rows of one relation.
#[derive(Debug)]
pub struct TableData {
    id: RelationId,
    name: String,
    attrs: Vec<AttributeDef>,
    /// Ordinals of the columns forming the row key
    key_columns: Vec<usize>,
    /// Last row id handed to a hidden column
    last_row_id: u64,
    rows: BTreeMap<String, VersionChain<Row>>,
}

impl TableData {
    pub fn new(id: RelationId, name: impl Into<String>, attrs: Vec<AttributeDef>) -> Self {
        let mut key_columns: Vec<usize> = attrs
            .iter()
            .enumerate()
            .filter(|(_, a)| a.primary)
            .map(|(i, _)| i)
            .collect();
        if key_columns.is_empty() {
            key_columns = attrs
                .iter()
                .enumerate()
                .filter(|(_, a)| a.hidden)
                .map(|(i, _)| i)
                .collect();
        }
        Self {
            id,
            name: name.into(),
            attrs,
            key_columns,
            last_row_id: 0,
            rows: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attrs
    }

    pub fn has_key(&self) -> bool {
        !self.key_columns.is_empty()
    }

    /// Number of row keys holding any version.
    pub fn chain_count(&self) -> usize {
        self.rows.len()
    }

    /// Encodes key values into the chain key.
    ///
    /// Fails unless exactly one value per key column is given.
    pub fn encode_key(&self, values: &[Value]) -> TxnResult<String> {
        if values.len() != self.key_columns.len() {
            return Err(TxnError::DefNotFound {
                id: self.id.to_string(),
                name: format!("primary key of {} values", values.len()),
            });
        }
        serde_json::to_string(values).map_err(|e| TxnError::internal(e.to_string()))
    }

    /// Extracts and encodes the key of a full row.
    pub fn row_key(&self, row: &Row) -> TxnResult<String> {
        let values: Vec<Value> = self
            .key_columns
            .iter()
            .map(|&i| row.values()[i].clone())
            .collect();
        self.encode_key(&values)
    }

    /// Checks arity, assigns hidden row ids, fills defaults and enforces
    /// nullability.
    pub fn normalize(&mut self, row: Row) -> TxnResult<Row> {
        let mut values = row.into_values();
        let hidden = self.attrs.iter().filter(|a| a.hidden).count();
        if hidden > 0 && values.len() + hidden == self.attrs.len() {
            let mut given = values.into_iter();
            values = self
                .attrs
                .iter()
                .map(|a| {
                    if a.hidden {
                        Value::Null
                    } else {
                        given.next().unwrap_or(Value::Null)
                    }
                })
                .collect();
        }
        if values.len() < self.attrs.len() {
            return Err(TxnError::column_not_found(&self.attrs[values.len()].name));
        }
        if values.len() > self.attrs.len() {
            return Err(TxnError::DefNotFound {
                id: self.id.to_string(),
                name: format!("#{}", self.attrs.len()),
            });
        }

        let Self {
            attrs, last_row_id, ..
        } = self;
        for (value, attr) in values.iter_mut().zip(attrs.iter()) {
            if value.is_null() && attr.hidden {
                *last_row_id += 1;
                *value = match attr.typ.oid {
                    TypeOid::UInt64 => Value::UInt64(*last_row_id),
                    _ => Value::Int64(*last_row_id as i64),
                };
            }
            if value.is_null() {
                if let Some(default) = &attr.default {
                    *value = default.clone();
                }
            }
            if value.is_null() && !attr.nullable {
                return Err(TxnError::ConstraintViolation {
                    column: attr.name.clone(),
                    reason: "null value in non-nullable column".into(),
                });
            }
        }
        Ok(Row::new(values))
    }

    pub fn chain(&self, key: &str) -> Option<&VersionChain<Row>> {
        self.rows.get(key)
    }

    pub fn chain_mut(&mut self, key: &str) -> Option<&mut VersionChain<Row>> {
        self.rows.get_mut(key)
    }

    pub fn chain_entry(&mut self, key: String) -> &mut VersionChain<Row> {
        self.rows.entry(key).or_default()
    }

    /// Rows live for `vis` that satisfy `predicate`, in key order.
    pub fn scan(&self, vis: &Visibility<'_>, predicate: &Predicate) -> TxnResult<Vec<Row>> {
        let bound = predicate.bind(&self.attrs)?;
        if let Some(key) = predicate.key() {
            let key = self.encode_key(key)?;
            return Ok(self
                .rows
                .get(&key)
                .and_then(|chain| chain.visible(vis))
                .map(|v| v.payload())
                .filter(|row| bound.matches(row))
                .cloned()
                .into_iter()
                .collect());
        }
        Ok(self
            .rows
            .values()
            .filter_map(|chain| chain.visible(vis))
            .map(|v| v.payload())
            .filter(|row| bound.matches(row))
            .cloned()
            .collect())
    }

    /// Prunes every chain, dropping chains left empty.
    ///
    /// Writers still referenced afterwards are added to `referenced`.
    /// Returns the number of versions removed.
    pub fn prune(
        &mut self,
        settled: impl Fn(TxnId) -> bool,
        referenced: &mut HashSet<TxnId>,
    ) -> usize {
        let mut removed = 0;
        self.rows.retain(|_, chain| {
            removed += chain.prune(&settled).len();
            referenced.extend(chain.writers());
            !chain.is_empty()
        });
        removed
    }

    /// Undoes all effects of `txn` on the given keys.
    pub fn rollback<'k>(&mut self, txn: TxnId, keys: impl Iterator<Item = &'k String>) {
        for key in keys {
            if let Some(chain) = self.rows.get_mut(key) {
                chain.rollback(txn);
                if chain.is_empty() {
                    self.rows.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeDesc;
    use crate::row;

    fn attrs() -> Vec<AttributeDef> {
        vec![
            AttributeDef::new("id", TypeDesc::int64()).primary(),
            AttributeDef::new("name", TypeDesc::varchar(20)),
            AttributeDef::new("score", TypeDesc::int64()).with_default(Value::Int64(0)),
        ]
    }

    #[test]
    fn test_key_columns_prefer_primary() {
        let table = TableData::new(RelationId(1), "t", attrs());
        assert!(table.has_key());
        assert_eq!(table.row_key(&row![7i64, "a", 1i64]).unwrap(), table.encode_key(&[Value::Int64(7)]).unwrap());
    }

    #[test]
    fn test_hidden_columns_key_keyless_tables() {
        let table = TableData::new(
            RelationId(1),
            "t",
            vec![
                AttributeDef::new("v", TypeDesc::int64()),
                AttributeDef::new("__rowid", TypeDesc::uint64()).hidden(),
            ],
        );
        assert!(table.has_key());

        let bare = TableData::new(RelationId(2), "u", vec![AttributeDef::new("v", TypeDesc::int64())]);
        assert!(!bare.has_key());
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let mut table = TableData::new(RelationId(1), "t", attrs());
        let row = table.normalize(row![1i64, "a", Value::Null]).unwrap();
        assert_eq!(row.get(2), Some(&Value::Int64(0)));
    }

    #[test]
    fn test_normalize_rejects_bad_arity() {
        let mut table = TableData::new(RelationId(1), "t", attrs());

        let short = table.normalize(row![1i64]);
        assert_eq!(short, Err(TxnError::column_not_found("name")));

        let long = table.normalize(row![1i64, "a", 2i64, 3i64]);
        assert!(matches!(long, Err(TxnError::DefNotFound { .. })));
    }

    #[test]
    fn test_normalize_rejects_null_key() {
        let mut table = TableData::new(RelationId(1), "t", attrs());
        let result = table.normalize(row![Value::Null, "a", 1i64]);
        assert!(matches!(result, Err(TxnError::ConstraintViolation { .. })));
    }

    fn rowid_table() -> TableData {
        TableData::new(
            RelationId(1),
            "h",
            vec![
                AttributeDef::new("v", TypeDesc::int64()),
                AttributeDef::new("__rowid", TypeDesc::uint64()).hidden(),
            ],
        )
    }

    #[test]
    fn test_normalize_assigns_hidden_row_ids() {
        let mut table = rowid_table();

        let omitted = table.normalize(row![1i64]).unwrap();
        let null = table.normalize(row![2i64, Value::Null]).unwrap();
        let given = table.normalize(row![3i64, Value::UInt64(77)]).unwrap();

        assert_eq!(omitted, row![1i64, Value::UInt64(1)]);
        assert_eq!(null, row![2i64, Value::UInt64(2)]);
        assert_eq!(given, row![3i64, Value::UInt64(77)]);
        assert_ne!(table.row_key(&omitted).unwrap(), table.row_key(&null).unwrap());
    }

    #[test]
    fn test_key_arity_must_match() {
        let table = TableData::new(RelationId(1), "t", attrs());
        assert!(table.encode_key(&[Value::Int64(1)]).is_ok());
        assert!(matches!(
            table.encode_key(&[Value::Int64(1), Value::Int64(2)]),
            Err(TxnError::DefNotFound { .. })
        ));
        assert!(matches!(table.encode_key(&[]), Err(TxnError::DefNotFound { .. })));
    }
}
