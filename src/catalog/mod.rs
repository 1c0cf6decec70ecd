//! Catalog vocabulary: databases, relations, attribute definitions, rows.

mod types;
mod value;

pub use types::{
    AttributeDef, Database, DatabaseId, Property, Relation, RelationDef, RelationId, TableDef,
    TypeDesc, TypeOid,
};
pub use value::{Row, Value};
