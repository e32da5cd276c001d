//! Offline source backed by a schema file.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::core::{BatchStream, ColumnDescriptor, SourceReader};
use crate::error::{MigrateError, Result};

/// Source that knows a table's columns but holds none of its rows.
///
/// Enough for a dry run: planning and the destination check only need the
/// schema. Reading rows fails with `Unsupported`.
pub struct SchemaFileSource {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl SchemaFileSource {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Load a YAML or JSON list of columns.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let columns: Vec<ColumnDescriptor> = serde_yaml::from_str(&content)?;
        if columns.is_empty() {
            return Err(MigrateError::SchemaConversion(format!(
                "schema file {:?} lists no columns",
                path
            )));
        }
        debug!("Loaded {} columns from {:?}", columns.len(), path);
        Ok(Self::new(format!("file://{}", path.display()), columns))
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnDescriptor> {
        self.columns
    }
}

#[async_trait]
impl SourceReader for SchemaFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn get_table_schema(&self, _table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.columns.clone())
    }

    async fn validate_table_access(&self, _table: &str) -> Result<()> {
        Ok(())
    }

    fn read_table<'a>(&'a self, table: &'a str, _batch_size: usize) -> BatchStream<'a> {
        let err = MigrateError::Unsupported(format!(
            "{} holds the schema of {} but no rows; reading data needs a warehouse client",
            self.name, table
        ));
        stream::once(async move { Err(err) }).boxed()
    }
}
