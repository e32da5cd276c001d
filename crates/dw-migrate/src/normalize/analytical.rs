//! Analytical destination: batch cleanup and conversion to Arrow.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder,
    StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::core::{base_type, ColumnData, ColumnDescriptor, ColumnKind, RowBatch, SqlValue};
use crate::error::{ColumnFailure, MigrateError, Result};

const EXAMPLE_COUNT: usize = 3;

/// Make a coerced batch loadable by a columnar loader.
///
/// Infinities become null, nullable integers collapse to plain integers
/// when no nulls are present (else floats), null-free nullable booleans
/// collapse to plain booleans and composite values are flattened to JSON text.
pub fn normalize(mut batch: RowBatch) -> RowBatch {
    for col in batch.columns_mut() {
        for v in col.values.iter_mut() {
            if matches!(v, SqlValue::Float(f) if f.is_infinite()) {
                *v = SqlValue::Null;
            }
        }

        match col.kind {
            ColumnKind::NullableInt64 => {
                if col.null_count() == 0 {
                    col.kind = ColumnKind::Int64;
                } else {
                    col.kind = ColumnKind::Float64;
                    for v in col.values.iter_mut() {
                        if let SqlValue::Int(i) = v {
                            *v = SqlValue::Float(*i as f64);
                        }
                    }
                }
            }
            ColumnKind::NullableBoolean if col.null_count() == 0 => {
                col.kind = ColumnKind::Boolean;
            }
            _ => {}
        }

        if col.has_composite() {
            warn!(
                "Column {} holds composite values; flattening to JSON text",
                col.name
            );
            flatten_composites(col);
        }
    }
    batch
}

pub(crate) fn flatten_composites(col: &mut ColumnData) {
    for v in col.values.iter_mut() {
        if v.is_composite() {
            *v = SqlValue::Text(v.to_json().to_string());
        }
    }
    col.kind = ColumnKind::Text;
}

/// Check that every column converts to Arrow, reporting each column that does not.
pub fn validate_serializable(
    batch: &RowBatch,
    declared: &[ColumnDescriptor],
    overrides: &IndexMap<String, String>,
) -> std::result::Result<(), Vec<ColumnFailure>> {
    let types = ColumnTypes::new(declared, overrides);
    let failures: Vec<ColumnFailure> = batch
        .columns()
        .iter()
        .filter_map(|col| {
            convert_column(col, &types)
                .err()
                .map(|reason| column_failure(col, &types, reason))
        })
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

/// Convert a batch to an Arrow `RecordBatch`.
///
/// A column with a destination type override converts to that type;
/// the rest convert by coerced kind and declared source type.
/// If the batch does not convert as a whole, each column is retried on its
/// own and every failing column is reported in one `Serialization` error.
pub fn to_record_batch(
    table: &str,
    batch: &RowBatch,
    declared: &[ColumnDescriptor],
    overrides: &IndexMap<String, String>,
) -> Result<RecordBatch> {
    match try_record_batch(batch, declared, overrides) {
        Ok(rb) => {
            debug!(
                "Converted {} rows x {} columns of {} to Arrow",
                rb.num_rows(),
                rb.num_columns(),
                table
            );
            Ok(rb)
        }
        Err(e) => {
            debug!("Arrow conversion of {} failed ({}); diagnosing per column", table, e);
            match validate_serializable(batch, declared, overrides) {
                Err(failures) => Err(MigrateError::Serialization {
                    table: table.to_string(),
                    failures,
                }),
                Ok(()) => Err(e),
            }
        }
    }
}

fn try_record_batch(
    batch: &RowBatch,
    declared: &[ColumnDescriptor],
    overrides: &IndexMap<String, String>,
) -> Result<RecordBatch> {
    let types = ColumnTypes::new(declared, overrides);
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for col in batch.columns() {
        let (data_type, array) =
            convert_column(col, &types).map_err(|reason| MigrateError::Serialization {
                table: String::new(),
                failures: vec![column_failure(col, &types, reason)],
            })?;
        fields.push(Field::new(col.name.clone(), data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Declared source types and destination type overrides, keyed by lowercase name.
struct ColumnTypes {
    declared: HashMap<String, String>,
    overridden: HashMap<String, String>,
}

impl ColumnTypes {
    fn new(declared: &[ColumnDescriptor], overrides: &IndexMap<String, String>) -> Self {
        Self {
            declared: declared
                .iter()
                .map(|c| (c.name.to_lowercase(), c.source_type.clone()))
                .collect(),
            overridden: overrides
                .iter()
                .map(|(name, ty)| (name.to_lowercase(), ty.clone()))
                .collect(),
        }
    }

    fn declared(&self, column: &str) -> Option<&str> {
        self.declared.get(&column.to_lowercase()).map(String::as_str)
    }

    fn overridden(&self, column: &str) -> Option<&str> {
        self.overridden.get(&column.to_lowercase()).map(String::as_str)
    }
}

fn column_failure(col: &ColumnData, types: &ColumnTypes, reason: String) -> ColumnFailure {
    ColumnFailure {
        column: col.name.clone(),
        declared_type: types
            .overridden(&col.name)
            .or_else(|| types.declared(&col.name))
            .map(str::to_string)
            .unwrap_or_else(|| col.kind.as_str().to_string()),
        examples: col.examples(EXAMPLE_COUNT),
        reason,
    }
}

/// Arrow type for an analytical destination type, when it has a fixed one.
fn override_type(destination_type: &str) -> Option<DataType> {
    let dt = match base_type(destination_type).as_str() {
        "string" | "json" => DataType::Utf8,
        "int64" | "int" | "integer" | "bigint" => DataType::Int64,
        "float64" | "float" => DataType::Float64,
        "bool" | "boolean" => DataType::Boolean,
        "bytes" => DataType::Binary,
        "date" => DataType::Date32,
        "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        "datetime" => DataType::Timestamp(TimeUnit::Microsecond, None),
        _ => return None,
    };
    Some(dt)
}

/// Arrow type for a column: its destination type override if one applies,
/// else its coerced kind, then its declared type.
fn target_type(col: &ColumnData, types: &ColumnTypes) -> std::result::Result<DataType, String> {
    if let Some(dt) = types.overridden(&col.name).and_then(override_type) {
        return Ok(dt);
    }
    let declared_type = types.declared(&col.name);
    let dt = match col.kind {
        ColumnKind::Int64 | ColumnKind::NullableInt64 => DataType::Int64,
        ColumnKind::Float64 => DataType::Float64,
        ColumnKind::Boolean | ColumnKind::NullableBoolean => DataType::Boolean,
        ColumnKind::Text => DataType::Utf8,
        ColumnKind::Binary => DataType::Binary,
        ColumnKind::Temporal => match declared_type.map(base_type).as_deref() {
            Some("date") => DataType::Date32,
            Some("timestamp") | Some("timestamp_ntz") => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
            _ => DataType::Timestamp(TimeUnit::Microsecond, None),
        },
        ColumnKind::Raw => raw_type(col)?,
    };
    Ok(dt)
}

/// Uncoerced columns convert by the representation their values share.
fn raw_type(col: &ColumnData) -> std::result::Result<DataType, String> {
    let mut found: Option<&SqlValue> = None;
    for v in col.values.iter().filter(|v| !v.is_null()) {
        match found {
            None => found = Some(v),
            Some(first) if std::mem::discriminant(first) != std::mem::discriminant(v) => {
                return Err(format!(
                    "mixed {} and {} values",
                    first.kind_name(),
                    v.kind_name()
                ));
            }
            _ => {}
        }
    }
    let dt = match found {
        None | Some(SqlValue::Text(_)) => DataType::Utf8,
        Some(SqlValue::Int(_)) => DataType::Int64,
        Some(SqlValue::Float(_)) => DataType::Float64,
        Some(SqlValue::Bool(_)) => DataType::Boolean,
        Some(SqlValue::Bytes(_)) => DataType::Binary,
        Some(SqlValue::Date(_)) => DataType::Date32,
        Some(SqlValue::DateTime(_)) => DataType::Timestamp(TimeUnit::Microsecond, None),
        Some(SqlValue::Timestamp(_)) => {
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        }
        Some(other) => {
            return Err(format!("nested {} values are not convertible", other.kind_name()));
        }
    };
    Ok(dt)
}

fn mismatch(expected: &str, v: &SqlValue) -> String {
    format!("expected {} value, found {}", expected, v.kind_name())
}

/// Build the Arrow array for one column.
fn convert_column(
    col: &ColumnData,
    types: &ColumnTypes,
) -> std::result::Result<(DataType, ArrayRef), String> {
    let data_type = target_type(col, types)?;
    let values = &col.values;

    let array: ArrayRef = match &data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    SqlValue::Int(i) => builder.append_value(*i),
                    SqlValue::Float(f) if f.fract() == 0.0 => builder.append_value(*f as i64),
                    SqlValue::Text(s) => match s.trim().parse::<i64>() {
                        Ok(i) => builder.append_value(i),
                        Err(_) => return Err(format!("'{}' is not an int64", s)),
                    },
                    other => return Err(mismatch("int64", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    SqlValue::Float(f) => builder.append_value(*f),
                    SqlValue::Int(i) => builder.append_value(*i as f64),
                    SqlValue::Text(s) => match s.trim().parse::<f64>() {
                        Ok(f) => builder.append_value(f),
                        Err(_) => return Err(format!("'{}' is not a float64", s)),
                    },
                    other => return Err(mismatch("float64", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    SqlValue::Bool(b) => builder.append_value(*b),
                    other => return Err(mismatch("bool", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for v in values {
                if v.is_composite() {
                    return Err(format!("nested {} value in a text column", v.kind_name()));
                }
                builder.append_option(v.to_text());
            }
            Arc::new(builder.finish())
        }
        DataType::Binary => {
            let mut builder = BinaryBuilder::new();
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    SqlValue::Bytes(b) => builder.append_value(b),
                    SqlValue::Text(s) => builder.append_value(s.as_bytes()),
                    other => return Err(mismatch("bytes", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(values.len());
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    other => builder.append_value(date_days(other)?),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(_, tz) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    v if v.is_null() => builder.append_null(),
                    other => builder.append_value(timestamp_micros(other)?),
                }
            }
            match tz {
                Some(tz) => Arc::new(builder.finish().with_timezone(tz.clone())),
                None => Arc::new(builder.finish()),
            }
        }
        other => return Err(format!("no Arrow conversion for {}", other)),
    };
    Ok((data_type, array))
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn date_days(v: &SqlValue) -> std::result::Result<i32, String> {
    let date = match v {
        SqlValue::Date(d) => *d,
        SqlValue::DateTime(dt) => dt.date(),
        SqlValue::Timestamp(ts) => ts.date_naive(),
        SqlValue::Text(s) => parse_date(s).ok_or_else(|| format!("'{}' is not a date", s))?,
        other => return Err(mismatch("date", other)),
    };
    i32::try_from((date - epoch()).num_days()).map_err(|e| e.to_string())
}

fn timestamp_micros(v: &SqlValue) -> std::result::Result<i64, String> {
    let ts: DateTime<Utc> = match v {
        SqlValue::Timestamp(ts) => *ts,
        SqlValue::DateTime(dt) => dt.and_utc(),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        SqlValue::Text(s) => {
            parse_timestamp(s).ok_or_else(|| format!("'{}' is not a timestamp", s))?
        }
        other => return Err(mismatch("timestamp", other)),
    };
    Ok(ts.timestamp_micros())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date_naive()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
