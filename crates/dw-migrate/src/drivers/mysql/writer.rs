//! MySQL/MariaDB destination writer.
//!
//! Uses a `mysql_async` pool and batched multi-row INSERT statements.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use tracing::{debug, info};

use crate::config::MysqlConfig;
use crate::core::{
    Destination, DestinationColumn, DestinationKind, LoadBatch, RowBatch, WriteMode,
};
use crate::error::{MigrateError, Result};

use super::dialect::{sql_value_to_mysql, MysqlDialect};

/// Relational destination backed by a MySQL connection pool.
pub struct MysqlDestination {
    pool: Pool,
    database: String,
    endpoint: String,
    dialect: MysqlDialect,
}

impl MysqlDestination {
    /// Build the pool. No connection is opened until first use.
    pub fn new(config: &MysqlConfig) -> Result<Self> {
        let max_conns = config.get_max_connections();
        let constraints = PoolConstraints::new(1, max_conns).ok_or_else(|| {
            MigrateError::Config(format!(
                "destination.mysql.max_connections must be at least 1, got {}",
                max_conns
            ))
        })?;

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        let opts: Opts = builder.into();
        Ok(Self {
            pool: Pool::new(opts),
            database: config.database.clone(),
            endpoint: format!("mysql://{}:{}/{}", config.host, config.port, config.database),
            dialect: MysqlDialect::new(),
        })
    }

    /// Build the pool and verify connectivity.
    pub async fn connect(config: &MysqlConfig) -> Result<Self> {
        let dest = Self::new(config)?;
        dest.test_connection().await?;
        info!("Connected to MySQL destination: {}", dest.endpoint);
        Ok(dest)
    }

    /// Disconnect every pooled connection.
    pub async fn close(self) -> Result<()> {
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(&self.endpoint, e))
    }

    async fn insert_rows(&self, conn: &mut Conn, table: &str, batch: &RowBatch) -> Result<u64> {
        let columns = batch.column_names();
        let max_rows = self.dialect.rows_per_insert(columns.len());
        if batch.is_empty() || max_rows == 0 {
            return Ok(0);
        }

        let rows = batch.to_rows();
        for chunk in rows.chunks(max_rows) {
            let sql = self
                .dialect
                .insert_sql(&self.database, table, &columns, chunk.len());
            let params: Vec<mysql_async::Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            conn.exec_drop(&sql, params)
                .await
                .map_err(|e| MigrateError::migration(table, format!("INSERT batch: {}", e)))?;
        }

        debug!("MySQL: wrote {} rows to {}", rows.len(), table);
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl Destination for MysqlDestination {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Relational
    }

    fn name(&self) -> &str {
        &self.endpoint
    }

    fn scope(&self) -> &str {
        &self.database
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(&self.endpoint, e))?;
        Ok(())
    }

    async fn table_exists(&self, scope: &str, table: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let sql = r#"
            SELECT COUNT(*) as cnt FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;
        let count: Option<i64> = conn.exec_first(sql, (scope, table)).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[DestinationColumn],
        _mode: WriteMode,
    ) -> Result<()> {
        let ddl = self.dialect.create_table_sql(&self.database, table, columns);
        debug!("DDL: {}", ddl);
        let mut conn = self.conn().await?;
        conn.query_drop(&ddl).await?;
        info!("Created table {}.{}", self.database, table);
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let sql = self.dialect.truncate_sql(&self.database, table);
        let mut conn = self.conn().await?;
        conn.query_drop(&sql).await?;
        info!("Truncated table {}.{}", self.database, table);
        Ok(())
    }

    async fn get_table_schema(&self, table: &str) -> Result<Vec<DestinationColumn>> {
        let mut conn = self.conn().await?;
        let sql = r#"
            SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let rows: Vec<(String, String, String, Option<String>)> =
            conn.exec(sql, (self.database.as_str(), table)).await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| DestinationColumn {
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default,
                ..DestinationColumn::new(name, data_type)
            })
            .collect())
    }

    async fn write_batch(&self, table: &str, batch: LoadBatch, mode: WriteMode) -> Result<u64> {
        let LoadBatch::Rows(rows) = batch else {
            return Err(MigrateError::Unsupported(
                "columnar batches on the relational destination".into(),
            ));
        };

        let mut conn = self.conn().await?;
        if mode == WriteMode::Truncate {
            let sql = self.dialect.truncate_sql(&self.database, table);
            conn.query_drop(&sql).await?;
            debug!("Truncated {} before first write", table);
        }
        self.insert_rows(&mut conn, table, &rows).await
    }
}
