//! Source-to-destination type mapping.
//!
//! One [`TypeMapper`] per destination kind. Unknown or unparseable types
//! fall back to the destination's text type with a warning; only a column
//! without a name fails the conversion.

mod analytical;
mod relational;

pub use analytical::AnalyticalTypeMapper;
pub use relational::RelationalTypeMapper;

use tracing::{info, warn};

use crate::core::{ColumnDescriptor, DestinationColumn, DestinationKind, TypeMapper};
use crate::error::{MigrateError, Result};

/// Mapper for the given destination kind.
pub fn mapper_for(kind: DestinationKind) -> Box<dyn TypeMapper> {
    match kind {
        DestinationKind::Analytical => Box::new(AnalyticalTypeMapper::new()),
        DestinationKind::Relational => Box::new(RelationalTypeMapper::new()),
    }
}

/// Map one source column to a destination column.
pub fn map_column(mapper: &dyn TypeMapper, col: &ColumnDescriptor) -> Result<DestinationColumn> {
    if col.name.trim().is_empty() {
        return Err(MigrateError::SchemaConversion(format!(
            "column of type '{}' has no name",
            col.source_type
        )));
    }

    let mapping = mapper.map_type(&col.source_type);
    if let Some(warning) = &mapping.warning {
        warn!("Column {}: {}", col.name, warning);
    }

    Ok(DestinationColumn {
        name: col.name.clone(),
        data_type: mapping.target_type,
        nullable: true,
        mode: mapping.mode,
        default: None,
        description: col.comment.clone(),
        subfields: mapping.subfields,
    })
}

/// Map every non-partition column of a source schema.
pub fn map_schema(
    mapper: &dyn TypeMapper,
    columns: &[ColumnDescriptor],
) -> Result<Vec<DestinationColumn>> {
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        if col.is_partition {
            info!("Skipping partition column {}", col.name);
            continue;
        }
        out.push(map_column(mapper, col)?);
    }
    Ok(out)
}

/// Text between the outermost `<` and `>` of a generic type.
pub(crate) fn generic_args(source_type: &str) -> Option<&str> {
    let start = source_type.find('<')?;
    let end = source_type.rfind('>')?;
    (end > start + 1).then(|| source_type[start + 1..end].trim())
}

/// Split generic arguments on top-level commas: `string,array<int>` -> [`string`, `array<int>`].
pub(crate) fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, ch) in args.char_indices() {
        match ch {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}
