//! Cell values and columnar row batches.
//!
//! A [`RowBatch`] is the unit of work of the migration loop: created by a
//! source read, mutated in place by coercion, mapping and normalization,
//! consumed by a destination write and then dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{MigrateError, Result};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    /// Array value (source `array<T>`).
    List(Vec<SqlValue>),
    /// Key/value pairs (source `map<K,V>` or `struct<...>`).
    Map(Vec<(SqlValue, SqlValue)>),
}

impl SqlValue {
    /// Check if this value is NULL. A floating NaN counts as null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, SqlValue::List(_) | SqlValue::Map(_))
    }

    /// Text rendering used for concatenation, case folding and string coercion.
    /// Returns `None` for null.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            v if v.is_null() => return None,
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            SqlValue::List(_) | SqlValue::Map(_) => self.to_json().to_string(),
            SqlValue::Null => return None,
        };
        Some(text)
    }

    /// JSON rendering, used to flatten composite values.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            v if v.is_null() => J::Null,
            SqlValue::Bool(b) => J::Bool(*b),
            SqlValue::Int(i) => J::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            SqlValue::List(items) => J::Array(items.iter().map(SqlValue::to_json).collect()),
            SqlValue::Map(entries) => J::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_text().unwrap_or_default(), v.to_json()))
                    .collect(),
            ),
            other => other.to_text().map(J::String).unwrap_or(J::Null),
        }
    }

    /// Short name of the value variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::List(_) => "list",
            SqlValue::Map(_) => "map",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// In-batch representation of a column.
///
/// Values are always held as [`SqlValue`]; the kind records which
/// representation coercion settled on and constrains what the values may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// As read from the source, not yet coerced.
    Raw,
    /// Strict 64-bit integers, no nulls.
    Int64,
    /// 64-bit integers with nulls.
    NullableInt64,
    /// 64-bit floats; nulls allowed.
    Float64,
    /// Strict booleans, no nulls.
    Boolean,
    /// Booleans with nulls.
    NullableBoolean,
    Text,
    Temporal,
    Binary,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Raw => "raw",
            ColumnKind::Int64 => "int64",
            ColumnKind::NullableInt64 => "nullable_int64",
            ColumnKind::Float64 => "float64",
            ColumnKind::Boolean => "bool",
            ColumnKind::NullableBoolean => "nullable_bool",
            ColumnKind::Text => "text",
            ColumnKind::Temporal => "temporal",
            ColumnKind::Binary => "binary",
        }
    }
}

/// One named column of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<SqlValue>,
}

impl ColumnData {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<SqlValue>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    /// An uncoerced column.
    pub fn raw(name: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self::new(name, ColumnKind::Raw, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub fn has_composite(&self) -> bool {
        self.values.iter().any(SqlValue::is_composite)
    }

    /// Up to `n` distinct non-null values rendered as text.
    pub fn examples(&self, n: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for v in &self.values {
            if out.len() >= n {
                break;
            }
            if let Some(text) = v.to_text() {
                if !out.contains(&text) {
                    out.push(text);
                }
            }
        }
        out
    }
}

/// A bounded, columnar batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    columns: Vec<ColumnData>,
    num_rows: usize,
}

impl RowBatch {
    /// Build a batch from columns; every column must have the same length.
    pub fn new(columns: Vec<ColumnData>) -> Result<Self> {
        let num_rows = columns.first().map(ColumnData::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != num_rows) {
            return Err(MigrateError::migration(
                "batch",
                format!(
                    "column '{}' has {} values, expected {}",
                    bad.name,
                    bad.len(),
                    num_rows
                ),
            ));
        }
        Ok(Self { columns, num_rows })
    }

    /// Build a raw batch from row-major values.
    pub fn from_rows(names: &[String], rows: Vec<Vec<SqlValue>>) -> Result<Self> {
        let mut columns: Vec<ColumnData> = names
            .iter()
            .map(|n| ColumnData::raw(n.clone(), Vec::with_capacity(rows.len())))
            .collect();
        let num_rows = rows.len();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(MigrateError::migration(
                    "batch",
                    format!("row {} has {} values, expected {}", i, row.len(), names.len()),
                ));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.values.push(value);
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [ColumnData] {
        &mut self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnData> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn position_ignore_case(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnData> {
        self.position(name).map(move |i| &mut self.columns[i])
    }

    /// Value of `column` at `row`, if both exist.
    pub fn value(&self, column: &str, row: usize) -> Option<&SqlValue> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// Append a column, or replace in place one whose name matches ignoring
    /// case. A replaced column keeps its existing spelling.
    pub fn put(&mut self, column: ColumnData) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.num_rows {
            return Err(MigrateError::migration(
                "batch",
                format!(
                    "column '{}' has {} values, expected {}",
                    column.name,
                    column.len(),
                    self.num_rows
                ),
            ));
        }
        if self.columns.is_empty() {
            self.num_rows = column.len();
        }
        match self.position_ignore_case(&column.name) {
            Some(i) => {
                let name = std::mem::take(&mut self.columns[i].name);
                self.columns[i] = ColumnData { name, ..column };
            }
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnData> {
        self.position(name).map(|i| self.columns.remove(i))
    }

    /// Keep only columns for which `keep` returns true.
    pub fn retain_columns<F: FnMut(&ColumnData) -> bool>(&mut self, keep: F) {
        self.columns.retain(keep);
    }

    /// Reorder to `names`; names not present are ignored, unnamed columns are dropped.
    pub fn select(&mut self, names: &[String]) {
        let mut taken: Vec<Option<ColumnData>> =
            std::mem::take(&mut self.columns).into_iter().map(Some).collect();
        for name in names {
            if let Some(slot) = taken
                .iter_mut()
                .find(|c| c.as_ref().is_some_and(|c| &c.name == name))
            {
                if let Some(col) = slot.take() {
                    self.columns.push(col);
                }
            }
        }
    }

    /// Move the named columns to the front in the given order; the rest keep their relative order.
    pub fn move_to_front(&mut self, names: &[String]) {
        let mut front = Vec::new();
        for name in names {
            if let Some(i) = self.position(name) {
                front.push(self.columns.remove(i));
            }
        }
        front.append(&mut self.columns);
        self.columns = front;
    }

    /// Drop every row whose mask entry is false. Returns the number of dropped rows.
    pub fn retain_rows(&mut self, mask: &[bool]) -> usize {
        let kept = mask.iter().filter(|k| **k).count();
        for col in &mut self.columns {
            let mut keep = mask.iter();
            col.values.retain(|_| *keep.next().unwrap_or(&true));
        }
        let dropped = self.num_rows - kept.min(self.num_rows);
        self.num_rows = kept.min(self.num_rows);
        dropped
    }

    /// Row-major copy of the values, in column order.
    pub fn to_rows(&self) -> Vec<Vec<SqlValue>> {
        (0..self.num_rows)
            .map(|r| self.columns.iter().map(|c| c.values[r].clone()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RowBatch {
        RowBatch::from_rows(
            &["id".to_string(), "status".to_string()],
            vec![
                vec![SqlValue::from("1"), SqlValue::from("007")],
                vec![SqlValue::from("2"), SqlValue::Null],
                vec![SqlValue::from("3"), SqlValue::from("010")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_builds_columns() {
        let batch = sample();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.column_names(), vec!["id", "status"]);
        assert_eq!(batch.value("status", 0), Some(&SqlValue::from("007")));
        assert_eq!(batch.column("status").unwrap().null_count(), 1);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = RowBatch::from_rows(
            &["a".to_string(), "b".to_string()],
            vec![vec![SqlValue::Int(1)]],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_retain_rows_reports_dropped() {
        let mut batch = sample();
        let dropped = batch.retain_rows(&[true, false, true]);
        assert_eq!(dropped, 1);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.value("id", 1), Some(&SqlValue::from("3")));
    }

    #[test]
    fn test_move_to_front_keeps_relative_order() {
        let mut batch = sample();
        batch
            .put(ColumnData::raw("c", vec![SqlValue::Null; 3]))
            .unwrap();
        batch.move_to_front(&["c".to_string(), "missing".to_string()]);
        assert_eq!(batch.column_names(), vec!["c", "id", "status"]);
    }

    #[test]
    fn test_put_replaces_column_differing_only_in_case() {
        let mut batch = sample();
        batch
            .put(ColumnData::new("ID", ColumnKind::Text, vec!["a".into(), "b".into(), "c".into()]))
            .unwrap();
        assert_eq!(batch.column_names(), vec!["id", "status"]);
        let id = batch.column("id").unwrap();
        assert_eq!(id.kind, ColumnKind::Text);
        assert_eq!(id.values[2], SqlValue::from("c"));
    }

    #[test]
    fn test_nan_is_null() {
        assert!(SqlValue::Float(f64::NAN).is_null());
        assert!(!SqlValue::Float(f64::INFINITY).is_null());
        assert_eq!(SqlValue::Float(f64::NAN).to_text(), None);
    }

    #[test]
    fn test_composite_text_is_json() {
        let v = SqlValue::List(vec![SqlValue::Int(1), SqlValue::from("a")]);
        assert_eq!(v.to_text().unwrap(), r#"[1,"a"]"#);
        let m = SqlValue::Map(vec![(SqlValue::from("k"), SqlValue::Bool(true))]);
        assert_eq!(m.to_text().unwrap(), r#"{"k":true}"#);
    }
}
