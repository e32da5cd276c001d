//! MySQL/MariaDB SQL generation.

use crate::core::{DestinationColumn, SqlValue};
use crate::normalize::dedupe_columns;

/// MySQL max placeholders per prepared statement.
pub const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL/MariaDB dialect.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier with backticks, doubling embedded backticks.
    pub fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Qualify a table name with its database.
    pub fn qualify_table(&self, database: &str, table: &str) -> String {
        if database.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(database), self.quote_ident(table))
        }
    }

    fn column_def(&self, col: &DestinationColumn) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), col.data_type);
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        if !col.description.is_empty() {
            def.push_str(&format!(" COMMENT '{}'", col.description.replace('\'', "''")));
        }
        def
    }

    /// `CREATE TABLE` for the given columns. Case-insensitive duplicates are dropped.
    pub fn create_table_sql(
        &self,
        database: &str,
        table: &str,
        columns: &[DestinationColumn],
    ) -> String {
        let col_defs: Vec<String> = dedupe_columns(columns)
            .iter()
            .map(|c| self.column_def(c))
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            self.qualify_table(database, table),
            col_defs.join(",\n    ")
        )
    }

    pub fn truncate_sql(&self, database: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualify_table(database, table))
    }

    /// Rows per INSERT statement for `num_cols` columns.
    pub fn rows_per_insert(&self, num_cols: usize) -> usize {
        if num_cols == 0 {
            0
        } else {
            (MYSQL_MAX_PLACEHOLDERS / num_cols).max(1)
        }
    }

    /// Multi-row `INSERT` with `?` placeholders.
    pub fn insert_sql(&self, database: &str, table: &str, columns: &[String], rows: usize) -> String {
        let col_list: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let all_placeholders = vec![row_placeholders; rows];
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualify_table(database, table),
            col_list.join(", "),
            all_placeholders.join(", ")
        )
    }
}

/// Convert a cell to a `mysql_async` parameter.
pub fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    match value {
        v if v.is_null() => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::Int(i) => mysql_async::Value::from(*i),
        SqlValue::Float(f) if f.is_finite() => mysql_async::Value::from(*f),
        SqlValue::Float(_) => mysql_async::Value::NULL,
        SqlValue::Text(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::Bytes(b) => mysql_async::Value::from(b.as_slice()),
        SqlValue::Date(d) => mysql_async::Value::from(*d),
        SqlValue::DateTime(dt) => mysql_async::Value::from(*dt),
        SqlValue::Timestamp(ts) => mysql_async::Value::from(ts.naive_utc()),
        other => mysql_async::Value::from(other.to_json().to_string()),
    }
}
