//! Physical schema descriptors
//!
//! These are the definitions the storage backend keeps. The query compiler
//! never sees them directly; the resolver translates attributes into
//! `ColDef`s on every call.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Value;

/// Database identity assigned by storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DatabaseId(pub u64);

/// Relation identity assigned by storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RelationId(pub u64);

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum TypeOid {
    Bool = 10,
    Int32 = 22,
    Int64 = 23,
    UInt64 = 28,
    Float64 = 31,
    Decimal = 32,
    Char = 40,
    Varchar = 41,
    Date = 50,
    Datetime = 51,
    Timestamp = 52,
    Blob = 60,
}

impl TypeOid {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Column type with its physical parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDesc {
    pub oid: TypeOid,
    /// Fixed byte size, 0 for variable-length types
    pub size: i32,
    /// Declared display/character width
    pub width: i32,
    pub precision: i32,
    pub scale: i32,
}

impl TypeDesc {
    pub fn new(oid: TypeOid, size: i32) -> Self {
        Self {
            oid,
            size,
            width: 0,
            precision: 0,
            scale: 0,
        }
    }

    pub fn bool() -> Self {
        Self::new(TypeOid::Bool, 1)
    }

    pub fn int32() -> Self {
        Self::new(TypeOid::Int32, 4)
    }

    pub fn int64() -> Self {
        Self::new(TypeOid::Int64, 8)
    }

    pub fn uint64() -> Self {
        Self::new(TypeOid::UInt64, 8)
    }

    pub fn float64() -> Self {
        Self::new(TypeOid::Float64, 8)
    }

    pub fn decimal(precision: i32, scale: i32) -> Self {
        Self {
            precision,
            scale,
            ..Self::new(TypeOid::Decimal, 16)
        }
    }

    pub fn varchar(width: i32) -> Self {
        Self {
            width,
            ..Self::new(TypeOid::Varchar, 0)
        }
    }

    pub fn date() -> Self {
        Self::new(TypeOid::Date, 4)
    }

    pub fn timestamp(precision: i32) -> Self {
        Self {
            precision,
            ..Self::new(TypeOid::Timestamp, 8)
        }
    }
}

/// Physical column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub typ: TypeDesc,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Part of the (possibly composite) primary key
    pub primary: bool,
    /// Excluded from projections except for UPDATE/DELETE
    pub hidden: bool,
    pub comment: String,
}

impl AttributeDef {
    /// A nullable, non-key, visible column.
    pub fn new(name: impl Into<String>, typ: TypeDesc) -> Self {
        Self {
            name: name.into(),
            typ,
            nullable: true,
            default: None,
            primary: false,
            hidden: false,
            comment: String::new(),
        }
    }

    /// Marks the column as part of the primary key. Key columns are never null.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// A free-form table property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// One table-level definition. Attributes are kept in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TableDef {
    Attribute(AttributeDef),
    Comment { text: String },
    Properties { properties: Vec<Property> },
}

impl TableDef {
    pub fn as_attribute(&self) -> Option<&AttributeDef> {
        match self {
            TableDef::Attribute(attr) => Some(attr),
            _ => None,
        }
    }
}

/// Definition passed to `create_relation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub defs: Vec<TableDef>,
}

impl RelationDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defs: Vec::new(),
        }
    }

    pub fn attribute(mut self, attr: AttributeDef) -> Self {
        self.defs.push(TableDef::Attribute(attr));
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.defs.push(TableDef::Comment { text: text.into() });
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let property = Property {
            key: key.into(),
            value: value.into(),
        };
        match self.defs.iter_mut().find_map(|d| match d {
            TableDef::Properties { properties } => Some(properties),
            _ => None,
        }) {
            Some(properties) => properties.push(property),
            None => self.defs.push(TableDef::Properties {
                properties: vec![property],
            }),
        }
        self
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.defs.iter().filter_map(TableDef::as_attribute)
    }
}

/// A database as returned by storage lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub id: DatabaseId,
    pub name: String,
}

/// A relation as returned by storage lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub database_id: DatabaseId,
    pub name: String,
}
