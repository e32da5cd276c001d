//! Mapping to relational (MySQL) column types.

use crate::core::{base_type, DestinationKind, TypeMapper, TypeMapping};

/// Maps source types to MySQL DDL types.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelationalTypeMapper;

impl RelationalTypeMapper {
    pub fn new() -> Self {
        Self
    }
}

/// Parameter list of a parameterized type: `decimal(10,2)` -> `10,2`.
fn params(source_type: &str) -> Option<String> {
    let start = source_type.find('(')?;
    let end = source_type.rfind(')')?;
    let inner: String = source_type[start + 1..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let valid = !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit() || c == ',');
    valid.then_some(inner)
}

impl TypeMapper for RelationalTypeMapper {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Relational
    }

    fn map_type(&self, source_type: &str) -> TypeMapping {
        match base_type(source_type).as_str() {
            "bigint" | "int" | "integer" | "smallint" | "tinyint" => TypeMapping::lossless("BIGINT"),
            "double" | "float" => TypeMapping::lossless("DOUBLE"),
            "decimal" | "numeric" => match params(source_type) {
                Some(p) => TypeMapping::lossless(format!("DECIMAL({})", p)),
                None => TypeMapping::lossless("DECIMAL(38,18)"),
            },
            "string" => TypeMapping::lossless("TEXT"),
            "varchar" => match params(source_type) {
                Some(p) => TypeMapping::lossless(format!("VARCHAR({})", p)),
                None => TypeMapping::lossless("TEXT"),
            },
            "char" => match params(source_type) {
                Some(p) => TypeMapping::lossless(format!("CHAR({})", p)),
                None => TypeMapping::lossless("TEXT"),
            },
            "boolean" | "bool" => TypeMapping::lossless("BOOLEAN"),
            "datetime" => TypeMapping::lossless("DATETIME"),
            "timestamp" | "timestamp_ntz" => TypeMapping::lossless("DATETIME(6)"),
            "date" => TypeMapping::lossless("DATE"),
            "binary" => TypeMapping::lossless("LONGBLOB"),
            "array" | "map" | "struct" => TypeMapping::lossy(
                "JSON",
                format!("composite type '{}' stored as JSON text", source_type),
            ),
            _ => TypeMapping::lossy(
                self.text_type(),
                format!("unknown type '{}' stored as TEXT", source_type),
            ),
        }
    }

    fn text_type(&self) -> &'static str {
        "TEXT"
    }
}
