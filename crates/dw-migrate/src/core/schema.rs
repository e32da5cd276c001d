//! Column descriptors for the source warehouse and both destination kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source column metadata as reported by warehouse schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    #[serde(default)]
    pub name: String,

    /// Raw declared type, possibly parameterized (`decimal(10,2)`, `array<string>`).
    #[serde(rename = "type", alias = "source_type")]
    pub source_type: String,

    /// Column comment, carried to the destination description.
    #[serde(default)]
    pub comment: String,

    /// Whether this is a partition column.
    #[serde(default, alias = "partition")]
    pub is_partition: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            comment: String::new(),
            is_partition: false,
        }
    }

    pub fn partition(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            is_partition: true,
            ..Self::new(name, source_type)
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Lowercased type name with parameters and generic arguments removed.
    pub fn base_type(&self) -> String {
        base_type(&self.source_type)
    }

    /// Type family of the declared type.
    pub fn family(&self) -> TypeFamily {
        TypeFamily::of(&self.source_type)
    }
}

/// Strip parameterization from a declared type: `decimal(10,2)` -> `decimal`.
pub fn base_type(source_type: &str) -> String {
    let lower = source_type.trim().to_lowercase();
    match lower.find(&['(', '<'][..]) {
        Some(idx) => lower[..idx].trim().to_string(),
        None => lower,
    }
}

/// Families of declared source types. Coercion and type mapping both key off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Integer,
    Float,
    Boolean,
    String,
    Temporal,
    Binary,
    Array,
    Map,
    Struct,
    Unknown,
}

impl TypeFamily {
    /// Classify a declared source type by its base name.
    pub fn of(source_type: &str) -> Self {
        match base_type(source_type).as_str() {
            "bigint" | "int" | "integer" | "smallint" | "tinyint" => TypeFamily::Integer,
            "double" | "float" | "decimal" | "numeric" => TypeFamily::Float,
            "boolean" | "bool" => TypeFamily::Boolean,
            "string" | "varchar" | "char" => TypeFamily::String,
            "datetime" | "timestamp" | "timestamp_ntz" | "date" => TypeFamily::Temporal,
            "binary" => TypeFamily::Binary,
            "array" => TypeFamily::Array,
            "map" => TypeFamily::Map,
            "struct" => TypeFamily::Struct,
            _ => TypeFamily::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, TypeFamily::Integer | TypeFamily::Float)
    }

    pub fn is_composite(self) -> bool {
        matches!(self, TypeFamily::Array | TypeFamily::Map | TypeFamily::Struct)
    }
}

/// The two supported destination kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Columnar analytical warehouse (BigQuery-like).
    #[serde(alias = "bigquery")]
    Analytical,
    /// Relational database (MySQL-like).
    #[serde(alias = "mysql")]
    Relational,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Analytical => write!(f, "analytical"),
            DestinationKind::Relational => write!(f, "relational"),
        }
    }
}

/// Field mode of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Repeated,
}

/// Destination column: an analytical field or a relational DDL column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationColumn {
    pub name: String,

    /// Destination type name (`INT64`, `STRING`, `BIGINT`, `VARCHAR(32)`...).
    pub data_type: String,

    pub nullable: bool,

    #[serde(default)]
    pub mode: ColumnMode,

    /// Declared default as an SQL literal (`0`, `'n/a'`, `CURRENT_TIMESTAMP`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subfields: Vec<DestinationColumn>,
}

impl DestinationColumn {
    /// A nullable scalar column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            mode: ColumnMode::Nullable,
            default: None,
            description: String::new(),
            subfields: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Lowercased base of the destination type (`varchar(32)` -> `varchar`).
    pub fn base_type(&self) -> String {
        base_type(&self.data_type)
    }
}
