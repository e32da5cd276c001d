//! Core traits for warehouse-to-destination migration.
//!
//! This module defines the capability interfaces the migration engine drives:
//!
//! - [`SourceReader`]: schema introspection and lazy batch reads from the source warehouse
//! - [`Destination`]: table management and batch loads, one trait for both destination kinds
//! - [`TypeMapper`]: maps declared source types to a destination type system
//!
//! Operations a destination kind does not have (truncate on the analytical
//! side, drop-and-recreate on the relational side) default to
//! [`MigrateError::Unsupported`].

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{MigrateError, Result};

use super::schema::{ColumnDescriptor, ColumnMode, DestinationColumn, DestinationKind};
use super::value::RowBatch;

/// Lazy, pull-based sequence of batches. The next batch is not fetched
/// until the consumer polls for it.
pub type BatchStream<'a> = BoxStream<'a, Result<RowBatch>>;

/// Per-batch write semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the table contents with this batch.
    Truncate,
    /// Add this batch to the table.
    Append,
}

/// A batch ready for a destination load.
#[derive(Debug, Clone)]
pub enum LoadBatch {
    /// Row-oriented payload for bulk INSERT paths.
    Rows(RowBatch),
    /// Columnar payload already converted for binary load paths.
    Columnar(RecordBatch),
}

impl LoadBatch {
    pub fn num_rows(&self) -> usize {
        match self {
            LoadBatch::Rows(b) => b.num_rows(),
            LoadBatch::Columnar(b) => b.num_rows(),
        }
    }
}

/// Read schema and data from the source warehouse.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Endpoint label used in logs and connection errors.
    fn name(&self) -> &str;

    /// Verify the source is reachable.
    async fn test_connection(&self) -> Result<()>;

    /// Column descriptors of a table, partition columns included.
    async fn get_table_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Verify the table can be read, including partition resolution.
    async fn validate_table_access(&self, table: &str) -> Result<()>;

    /// Stream the table in batches of at most `batch_size` rows.
    ///
    /// Each call starts a fresh read; a stream cannot be resumed mid-way.
    fn read_table<'a>(&'a self, table: &'a str, batch_size: usize) -> BatchStream<'a>;
}

/// Write schema and data to a destination.
#[async_trait]
pub trait Destination: Send + Sync {
    fn kind(&self) -> DestinationKind;

    /// Endpoint label used in logs and connection errors.
    fn name(&self) -> &str;

    /// Dataset (analytical) or database (relational) the tables live in.
    fn scope(&self) -> &str;

    async fn test_connection(&self) -> Result<()>;

    async fn table_exists(&self, scope: &str, table: &str) -> Result<bool>;

    async fn create_table(
        &self,
        table: &str,
        columns: &[DestinationColumn],
        mode: WriteMode,
    ) -> Result<()>;

    /// Empty a table in place, keeping its DDL.
    async fn truncate_table(&self, table: &str) -> Result<()> {
        Err(MigrateError::Unsupported(format!(
            "truncate_table({}) on {} destination",
            table,
            self.kind()
        )))
    }

    /// Drop a table.
    async fn delete_table(&self, scope: &str, table: &str) -> Result<()> {
        Err(MigrateError::Unsupported(format!(
            "delete_table({}.{}) on {} destination",
            scope,
            table,
            self.kind()
        )))
    }

    /// Declared columns of an existing table, in ordinal order.
    async fn get_table_schema(&self, table: &str) -> Result<Vec<DestinationColumn>> {
        Err(MigrateError::Unsupported(format!(
            "get_table_schema({}) on {} destination",
            table,
            self.kind()
        )))
    }

    /// Load one batch. Returns the number of rows written.
    async fn write_batch(&self, table: &str, batch: LoadBatch, mode: WriteMode) -> Result<u64>;
}

/// Maps declared source types to a destination type system.
pub trait TypeMapper: Send + Sync {
    /// Destination kind this mapper produces columns for.
    fn kind(&self) -> DestinationKind;

    /// Map a declared source type (parameters allowed).
    fn map_type(&self, source_type: &str) -> TypeMapping;

    /// Destination type used for text placeholders and fallbacks.
    fn text_type(&self) -> &'static str;
}

/// Result of mapping a source type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Destination type string (e.g. `INT64`, `VARCHAR(64)`).
    pub target_type: String,
    pub mode: ColumnMode,
    /// Nested fields for record types.
    pub subfields: Vec<DestinationColumn>,
    /// Whether this mapping loses structure or precision.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            mode: ColumnMode::Nullable,
            subfields: Vec::new(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            is_lossy: true,
            warning: Some(warning.into()),
            ..Self::lossless(target_type)
        }
    }

    pub fn repeated(mut self) -> Self {
        self.mode = ColumnMode::Repeated;
        self
    }

    pub fn with_subfields(mut self, subfields: Vec<DestinationColumn>) -> Self {
        self.subfields = subfields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping_lossless() {
        let mapping = TypeMapping::lossless("INT64");
        assert_eq!(mapping.target_type, "INT64");
        assert_eq!(mapping.mode, ColumnMode::Nullable);
        assert!(!mapping.is_lossy);
        assert!(mapping.warning.is_none());
    }

    #[test]
    fn test_type_mapping_lossy_repeated() {
        let mapping = TypeMapping::lossy("RECORD", "struct fields are not parsed").repeated();
        assert!(mapping.is_lossy);
        assert_eq!(mapping.mode, ColumnMode::Repeated);
        assert_eq!(
            mapping.warning.as_deref(),
            Some("struct fields are not parsed")
        );
    }
}
