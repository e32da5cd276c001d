//! Source warehouse reader.
//!
//! [`WarehouseSource`] implements [`SourceReader`] on top of a minimal
//! [`WarehouseSession`]: something that can ping, describe a table and run
//! a query returning a row stream. Partitioned tables are read from their
//! latest partition only.

mod query;
mod schema_file;

pub use query::{quote_literal, LatestPartitionQuery, ReadScope, FALLBACK_ROW_CAP};
pub use schema_file::SchemaFileSource;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info};

use crate::core::{BatchStream, ColumnDescriptor, RowBatch, SourceReader, SqlValue};
use crate::error::{MigrateError, Result};

/// Raw rows streamed by a session query.
pub type RowStream = BoxStream<'static, Result<Vec<SqlValue>>>;

/// Result of a session query.
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: RowStream,
}

/// Minimal warehouse client the reader needs.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Column descriptors of a table, partition columns flagged.
    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    async fn query(&self, sql: &str) -> Result<QueryRows>;
}

/// Source reader for a columnar warehouse.
pub struct WarehouseSource<S> {
    session: S,
    endpoint: String,
    blank_as_null: bool,
}

impl<S: WarehouseSession> WarehouseSource<S> {
    pub fn new(session: S, endpoint: impl Into<String>) -> Self {
        Self {
            session,
            endpoint: endpoint.into(),
            blank_as_null: true,
        }
    }

    /// Treat `""`, `null` and `none` text cells as null on read (default: on).
    pub fn with_blank_as_null(mut self, enabled: bool) -> Self {
        self.blank_as_null = enabled;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Probe for the latest partition and return the planner with its scope.
    pub async fn plan_read(&self, table: &str) -> Result<(LatestPartitionQuery, ReadScope)> {
        let schema = self.session.describe_table(table).await?;
        let partitions: Vec<String> = schema
            .iter()
            .filter(|c| c.is_partition)
            .map(|c| c.name.clone())
            .collect();
        let planner = LatestPartitionQuery::new(table, &partitions);

        let Some(probe) = planner.probe_sql() else {
            debug!("{} is not partitioned; read capped at {} rows", table, FALLBACK_ROW_CAP);
            return Ok((planner, ReadScope::Capped));
        };

        let mut result = self.session.query(&probe).await?;
        let row = match result.rows.next().await {
            Some(row) => Some(row?),
            None => None,
        };
        let scope = planner.scope_from_probe(row.as_deref());
        match &scope {
            ReadScope::Partition(pairs) => info!("Reading {} from latest partition {:?}", table, pairs),
            ReadScope::Capped => info!(
                "No partition data found for {}; read capped at {} rows",
                table, FALLBACK_ROW_CAP
            ),
        }
        Ok((planner, scope))
    }

    async fn open(&self, table: &str) -> Result<QueryRows> {
        let (planner, scope) = self.plan_read(table).await?;
        let sql = planner.read_sql(&scope, None);
        debug!("Source query: {}", sql);
        self.session.query(&sql).await
    }
}

/// `""`, `null` and `none` (any case, surrounding whitespace ignored) become null.
pub fn clean_raw_value(value: SqlValue) -> SqlValue {
    match &value {
        SqlValue::Text(s) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("none") {
                SqlValue::Null
            } else {
                value
            }
        }
        _ => value,
    }
}

fn into_batches(rows: QueryRows, batch_size: usize, blank_as_null: bool) -> BatchStream<'static> {
    let QueryRows { columns, rows } = rows;
    rows.chunks(batch_size)
        .map(move |chunk| {
            let rows = chunk
                .into_iter()
                .map(|row| {
                    row.map(|values| {
                        if blank_as_null {
                            values.into_iter().map(clean_raw_value).collect()
                        } else {
                            values
                        }
                    })
                })
                .collect::<Result<Vec<Vec<SqlValue>>>>()?;
            RowBatch::from_rows(&columns, rows)
        })
        .boxed()
}

#[async_trait]
impl<S: WarehouseSession> SourceReader for WarehouseSource<S> {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn test_connection(&self) -> Result<()> {
        self.session
            .ping()
            .await
            .map_err(|e| MigrateError::connection(&self.endpoint, e))
    }

    async fn get_table_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.session.describe_table(table).await
    }

    async fn validate_table_access(&self, table: &str) -> Result<()> {
        let (planner, scope) = self.plan_read(table).await?;
        let sql = planner.read_sql(&scope, Some(1));
        let mut result = self.session.query(&sql).await?;
        if let Some(row) = result.rows.next().await {
            row?;
        }
        debug!("Table {} is readable", table);
        Ok(())
    }

    fn read_table<'a>(&'a self, table: &'a str, batch_size: usize) -> BatchStream<'a> {
        let batch_size = batch_size.max(1);
        let blank_as_null = self.blank_as_null;
        stream::once(self.open(table))
            .map(move |opened| -> BatchStream<'static> {
                match opened {
                    Ok(rows) => into_batches(rows, batch_size, blank_as_null),
                    Err(e) => stream::once(async move { Err(e) }).boxed(),
                }
            })
            .flatten()
            .boxed()
    }
}
