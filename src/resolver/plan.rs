//! Plan-side schema shapes handed to the query compiler
//!
//! Derived from the catalog on every call; never persisted.

use serde::{Deserialize, Serialize};

use crate::catalog::{AttributeDef, Value};

/// Qualified name of a resolved object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub schema_name: String,
    pub obj_name: String,
}

/// Column type as the planner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanType {
    pub id: i32,
    pub nullable: bool,
    pub width: i32,
    pub precision: i32,
    pub size: i32,
    pub scale: i32,
}

/// A column definition for planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColDef {
    pub name: String,
    pub typ: PlanType,
    pub default: Option<Value>,
    pub primary: bool,
    /// Ordinal of the column among the relation's attributes
    pub pk_idx: i32,
    pub hidden: bool,
    pub comment: String,
}

impl ColDef {
    /// Converts the attribute at ordinal `idx`.
    pub fn from_attribute(idx: usize, attr: &AttributeDef) -> Self {
        Self {
            name: attr.name.clone(),
            typ: PlanType {
                id: attr.typ.oid.as_i32(),
                nullable: attr.nullable,
                width: attr.typ.width,
                precision: attr.typ.precision,
                size: attr.typ.size,
                scale: attr.typ.scale,
            },
            default: attr.default.clone(),
            primary: attr.primary,
            pk_idx: idx as i32,
            hidden: attr.hidden,
            comment: attr.comment.clone(),
        }
    }
}

/// A table as the planner sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTableDef {
    pub name: String,
    pub cols: Vec<ColDef>,
}

/// Planner cost estimate. Cost-based optimization is not done here, so
/// every estimate is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub card: f64,
    pub rowsize: f64,
    pub ndv: f64,
    pub start: f64,
    pub total: f64,
}

/// Kind of statement being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    /// Update and Delete address rows through their hidden columns.
    pub fn includes_hidden_columns(&self) -> bool {
        matches!(self, StatementKind::Update | StatementKind::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeDesc;

    #[test]
    fn test_hidden_columns_by_statement() {
        assert!(StatementKind::Update.includes_hidden_columns());
        assert!(StatementKind::Delete.includes_hidden_columns());
        assert!(!StatementKind::Select.includes_hidden_columns());
        assert!(!StatementKind::Insert.includes_hidden_columns());
        assert!(!StatementKind::Other.includes_hidden_columns());
    }

    #[test]
    fn test_col_def_from_attribute() {
        let attr = AttributeDef::new("price", TypeDesc::decimal(10, 2))
            .not_null()
            .with_comment("unit price");
        let col = ColDef::from_attribute(3, &attr);

        assert_eq!(col.pk_idx, 3);
        assert_eq!(col.typ.precision, 10);
        assert_eq!(col.typ.scale, 2);
        assert!(!col.typ.nullable);
        assert_eq!(col.comment, "unit price");
    }
}
