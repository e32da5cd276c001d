//! Read queries restricted to the latest partition.

use crate::core::SqlValue;

/// Row cap for reads that cannot be restricted to a partition.
pub const FALLBACK_ROW_CAP: usize = 100_000;

/// Conventional partition key of the source warehouse.
const DEFAULT_PARTITION_KEY: &str = "pt";

/// Which rows a read covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    /// Rows whose partition columns equal these values.
    Partition(Vec<(String, String)>),
    /// No partition restriction; the read is capped at [`FALLBACK_ROW_CAP`].
    Capped,
}

/// Builds the probe and read SQL for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestPartitionQuery {
    table: String,
    probe_columns: Vec<String>,
}

impl LatestPartitionQuery {
    /// `partition_columns` in declaration order. When one of them is the
    /// conventional `pt` key, only that column is probed.
    pub fn new(table: impl Into<String>, partition_columns: &[String]) -> Self {
        let probe_columns = match partition_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(DEFAULT_PARTITION_KEY))
        {
            Some(pt) => vec![pt.clone()],
            None => partition_columns.to_vec(),
        };
        Self {
            table: table.into(),
            probe_columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn probe_columns(&self) -> &[String] {
        &self.probe_columns
    }

    /// `SELECT MAX(c) AS max_c, ... FROM t`, or `None` for unpartitioned tables.
    pub fn probe_sql(&self) -> Option<String> {
        if self.probe_columns.is_empty() {
            return None;
        }
        let maxes: Vec<String> = self
            .probe_columns
            .iter()
            .map(|c| format!("MAX({c}) AS max_{c}"))
            .collect();
        Some(format!("SELECT {} FROM {}", maxes.join(", "), self.table))
    }

    /// Scope from the probe's result row. Columns whose maximum is null are left out.
    pub fn scope_from_probe(&self, row: Option<&[SqlValue]>) -> ReadScope {
        let Some(row) = row else {
            return ReadScope::Capped;
        };
        let pairs: Vec<(String, String)> = self
            .probe_columns
            .iter()
            .zip(row)
            .filter_map(|(col, v)| v.to_text().map(|text| (col.clone(), text)))
            .collect();
        if pairs.is_empty() {
            ReadScope::Capped
        } else {
            ReadScope::Partition(pairs)
        }
    }

    /// Read SQL for a scope, optionally with a tighter row limit.
    pub fn read_sql(&self, scope: &ReadScope, limit: Option<usize>) -> String {
        match scope {
            ReadScope::Partition(pairs) if !pairs.is_empty() => {
                let conditions: Vec<String> = pairs
                    .iter()
                    .map(|(col, value)| format!("{} = {}", col, quote_literal(value)))
                    .collect();
                let mut sql = format!(
                    "SELECT * FROM {} WHERE {}",
                    self.table,
                    conditions.join(" AND ")
                );
                if let Some(n) = limit {
                    sql.push_str(&format!(" LIMIT {}", n));
                }
                sql
            }
            _ => {
                let cap = limit.map_or(FALLBACK_ROW_CAP, |n| n.min(FALLBACK_ROW_CAP));
                format!("SELECT * FROM {} LIMIT {}", self.table, cap)
            }
        }
    }
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
