//! Schema-driven type coercion.
//!
//! Every column is coerced according to its *declared* source type. Values
//! are never inspected to decide what a column is: a string column holding
//! `"007"` stays the text `"007"`.
//!
//! Problems are recovered locally. A column that cannot be coerced keeps
//! its raw form; if the whole pass fails, only infinities are stripped.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::CompatConfig;
use crate::core::{ColumnData, ColumnDescriptor, ColumnKind, RowBatch, SqlValue, TypeFamily};
use crate::error::Result;

const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "y"];
const FALSE_TOKENS: &[&str] = &["false", "0", "no", "n", ""];

/// String handling switches, taken from the `compat` config group.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionOptions {
    pub preserve_string_null_tokens: bool,
    pub string_null_tokens: Vec<String>,
    pub string_null_tokens_case_insensitive: bool,
    pub treat_empty_string_as_null: bool,
}

impl Default for CoercionOptions {
    fn default() -> Self {
        Self::from(&CompatConfig::default())
    }
}

impl From<&CompatConfig> for CoercionOptions {
    fn from(compat: &CompatConfig) -> Self {
        Self {
            preserve_string_null_tokens: compat.preserve_string_null_tokens,
            string_null_tokens: compat.string_null_tokens.clone(),
            string_null_tokens_case_insensitive: compat.string_null_tokens_case_insensitive,
            treat_empty_string_as_null: compat.treat_empty_string_as_null,
        }
    }
}

impl CoercionOptions {
    fn is_null_token(&self, s: &str) -> bool {
        if self.string_null_tokens_case_insensitive {
            self.string_null_tokens
                .iter()
                .any(|t| t.eq_ignore_ascii_case(s))
        } else {
            self.string_null_tokens.iter().any(|t| t == s)
        }
    }
}

/// Coerces raw batches to the representation implied by the source schema.
#[derive(Debug, Default)]
pub struct TypeCoercer {
    options: CoercionOptions,
    warned_types: Mutex<HashSet<String>>,
}

impl TypeCoercer {
    pub fn new(options: CoercionOptions) -> Self {
        Self {
            options,
            warned_types: Mutex::new(HashSet::new()),
        }
    }

    pub fn options(&self) -> &CoercionOptions {
        &self.options
    }

    /// Coerce every column declared in `schema`. Undeclared columns are kept raw.
    pub fn coerce(&self, batch: RowBatch, schema: &[ColumnDescriptor]) -> RowBatch {
        match self.try_coerce(&batch, schema) {
            Ok(coerced) => coerced,
            Err(e) => {
                warn!("Type coercion failed ({}); falling back to basic cleanup", e);
                basic_cleanup(batch)
            }
        }
    }

    fn try_coerce(&self, batch: &RowBatch, schema: &[ColumnDescriptor]) -> Result<RowBatch> {
        let declared: HashMap<String, &ColumnDescriptor> = schema
            .iter()
            .map(|c| (c.name.to_lowercase(), c))
            .collect();

        let mut columns = Vec::with_capacity(batch.num_columns());
        for col in batch.columns() {
            let Some(desc) = declared.get(&col.name.to_lowercase()) else {
                columns.push(col.clone());
                continue;
            };
            match self.coerce_column(col, desc) {
                Ok(coerced) => {
                    debug!(
                        "Coerced {} ({}) to {}",
                        col.name,
                        desc.source_type,
                        coerced.kind.as_str()
                    );
                    columns.push(coerced);
                }
                Err(reason) => {
                    warn!(
                        "Cannot coerce column {} to declared type {}: {}; keeping raw values",
                        col.name, desc.source_type, reason
                    );
                    columns.push(col.clone());
                }
            }
        }
        RowBatch::new(columns)
    }

    fn coerce_column(
        &self,
        col: &ColumnData,
        desc: &ColumnDescriptor,
    ) -> std::result::Result<ColumnData, String> {
        match desc.family() {
            TypeFamily::Integer => coerce_integer(col),
            TypeFamily::Float => coerce_float(col),
            TypeFamily::Boolean => coerce_boolean(col),
            TypeFamily::String => Ok(self.coerce_string(col)),
            TypeFamily::Temporal => Ok(ColumnData::new(
                col.name.clone(),
                ColumnKind::Temporal,
                col.values.clone(),
            )),
            TypeFamily::Binary => Ok(ColumnData::new(
                col.name.clone(),
                ColumnKind::Binary,
                col.values.clone(),
            )),
            TypeFamily::Array | TypeFamily::Map | TypeFamily::Struct => Ok(col.clone()),
            TypeFamily::Unknown => {
                self.warn_unknown_type(&desc.source_type);
                Ok(col.clone())
            }
        }
    }

    fn coerce_string(&self, col: &ColumnData) -> ColumnData {
        let opts = &self.options;
        let mut tokens_nulled = 0usize;
        let values = col
            .values
            .iter()
            .map(|v| match v.to_text() {
                None => SqlValue::Null,
                Some(s) if opts.treat_empty_string_as_null && s.is_empty() => SqlValue::Null,
                Some(s) if !opts.preserve_string_null_tokens && opts.is_null_token(&s) => {
                    tokens_nulled += 1;
                    SqlValue::Null
                }
                Some(s) => SqlValue::Text(s),
            })
            .collect();
        if tokens_nulled > 0 {
            debug!("{}: {} null tokens mapped to null", col.name, tokens_nulled);
        }
        ColumnData::new(col.name.clone(), ColumnKind::Text, values)
    }

    fn warn_unknown_type(&self, source_type: &str) {
        let first = self
            .warned_types
            .lock()
            .map(|mut seen| seen.insert(source_type.to_lowercase()))
            .unwrap_or(true);
        if first {
            warn!(
                "Unrecognized declared type '{}'; values pass through unchanged",
                source_type
            );
        }
    }
}

enum IntParse {
    Int(i64),
    Null,
    /// Numeric but not an integer; kept if the column widens to float.
    Float(f64),
    Invalid,
}

fn parse_integer(value: &SqlValue) -> std::result::Result<IntParse, String> {
    let parsed = match value {
        v if v.is_null() => IntParse::Null,
        SqlValue::Int(i) => IntParse::Int(*i),
        SqlValue::Bool(b) => IntParse::Int(i64::from(*b)),
        SqlValue::Float(f) => float_to_int(*f),
        SqlValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                IntParse::Null
            } else if let Ok(i) = s.parse::<i64>() {
                IntParse::Int(i)
            } else {
                match s.parse::<f64>() {
                    Ok(f) => float_to_int(f),
                    Err(_) => IntParse::Invalid,
                }
            }
        }
        v if v.is_composite() => {
            return Err(format!("{} value in a scalar column", v.kind_name()));
        }
        _ => IntParse::Invalid,
    };
    Ok(parsed)
}

fn float_to_int(f: f64) -> IntParse {
    if f.is_nan() {
        IntParse::Invalid
    } else if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        IntParse::Int(f as i64)
    } else {
        IntParse::Float(f)
    }
}

/// Strict integers when every value parses; otherwise nullable floats.
fn coerce_integer(col: &ColumnData) -> std::result::Result<ColumnData, String> {
    let parsed = col
        .values
        .iter()
        .map(parse_integer)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let failures = parsed
        .iter()
        .filter(|p| matches!(p, IntParse::Float(_) | IntParse::Invalid))
        .count();

    if failures == 0 {
        let has_null = parsed.iter().any(|p| matches!(p, IntParse::Null));
        let values = parsed
            .into_iter()
            .map(|p| match p {
                IntParse::Int(i) => SqlValue::Int(i),
                _ => SqlValue::Null,
            })
            .collect();
        let kind = if has_null {
            ColumnKind::NullableInt64
        } else {
            ColumnKind::Int64
        };
        return Ok(ColumnData::new(col.name.clone(), kind, values));
    }

    warn!(
        "{}: {} values are not integers; column widened to float",
        col.name, failures
    );
    let values = parsed
        .into_iter()
        .map(|p| match p {
            IntParse::Int(i) => SqlValue::Float(i as f64),
            IntParse::Float(f) => SqlValue::Float(f),
            IntParse::Null | IntParse::Invalid => SqlValue::Null,
        })
        .collect();
    Ok(ColumnData::new(col.name.clone(), ColumnKind::Float64, values))
}

fn parse_float(value: &SqlValue) -> std::result::Result<Option<f64>, String> {
    let parsed = match value {
        v if v.is_null() => None,
        SqlValue::Int(i) => Some(*i as f64),
        SqlValue::Float(f) => Some(*f),
        SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        SqlValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
        v if v.is_composite() => {
            return Err(format!("{} value in a scalar column", v.kind_name()));
        }
        _ => None,
    };
    Ok(parsed)
}

/// 64-bit floats; unparseable values become null. Infinities are kept here.
fn coerce_float(col: &ColumnData) -> std::result::Result<ColumnData, String> {
    let mut unparsed = 0usize;
    let mut values = Vec::with_capacity(col.len());
    for v in &col.values {
        match parse_float(v)? {
            Some(f) => values.push(SqlValue::Float(f)),
            None => {
                if !v.is_null() && !matches!(v, SqlValue::Text(s) if s.trim().is_empty()) {
                    unparsed += 1;
                }
                values.push(SqlValue::Null);
            }
        }
    }
    if unparsed > 0 {
        warn!("{}: {} unparseable numeric values set to null", col.name, unparsed);
    }
    Ok(ColumnData::new(col.name.clone(), ColumnKind::Float64, values))
}

/// Token match on the textual form of a value. `None` means unrecognized.
pub(crate) fn parse_bool_token(value: &SqlValue) -> Option<bool> {
    match value {
        SqlValue::Bool(b) => Some(*b),
        SqlValue::Int(1) => Some(true),
        SqlValue::Int(0) => Some(false),
        other => {
            let text = other.to_text()?.trim().to_lowercase();
            if TRUE_TOKENS.contains(&text.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&text.as_str()) {
                Some(false)
            } else {
                None
            }
        }
    }
}

fn coerce_boolean(col: &ColumnData) -> std::result::Result<ColumnData, String> {
    let mut unrecognized = 0usize;
    let mut has_null = false;
    let mut values = Vec::with_capacity(col.len());
    for v in &col.values {
        if v.is_composite() {
            return Err(format!("{} value in a scalar column", v.kind_name()));
        }
        if v.is_null() {
            has_null = true;
            values.push(SqlValue::Null);
            continue;
        }
        match parse_bool_token(v) {
            Some(b) => values.push(SqlValue::Bool(b)),
            None => {
                unrecognized += 1;
                has_null = true;
                values.push(SqlValue::Null);
            }
        }
    }
    if unrecognized > 0 {
        warn!(
            "{}: {} values are not boolean tokens; set to null",
            col.name, unrecognized
        );
    }
    let kind = if has_null {
        ColumnKind::NullableBoolean
    } else {
        ColumnKind::Boolean
    };
    Ok(ColumnData::new(col.name.clone(), kind, values))
}

/// Minimal cleanup: infinite floats become null. Everything else is left alone.
pub fn basic_cleanup(mut batch: RowBatch) -> RowBatch {
    for col in batch.columns_mut() {
        for v in col.values.iter_mut() {
            if matches!(v, SqlValue::Float(f) if f.is_infinite()) {
                *v = SqlValue::Null;
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|s| s.to_string()).collect()
    }

    fn one_column(name: &str, values: Vec<SqlValue>) -> RowBatch {
        RowBatch::new(vec![ColumnData::raw(name, values)]).unwrap()
    }

    #[test]
    fn test_declared_types_drive_coercion() {
        let schema = vec![
            ColumnDescriptor::new("id", "bigint"),
            ColumnDescriptor::new("status", "string"),
            ColumnDescriptor::partition("pt", "string"),
        ];
        let batch = RowBatch::from_rows(
            &names(&["id", "status", "pt"]),
            vec![vec!["7".into(), "007".into(), "20240101".into()]],
        )
        .unwrap();

        let out = TypeCoercer::default().coerce(batch, &schema);
        let id = out.column("id").unwrap();
        assert_eq!(id.kind, ColumnKind::Int64);
        assert_eq!(id.values, vec![SqlValue::Int(7)]);
        let status = out.column("status").unwrap();
        assert_eq!(status.kind, ColumnKind::Text);
        assert_eq!(status.values, vec![SqlValue::Text("007".into())]);
        assert_eq!(out.value("pt", 0), Some(&SqlValue::Text("20240101".into())));
    }

    #[test]
    fn test_digit_strings_stay_text() {
        let schema = vec![ColumnDescriptor::new("code", "varchar(8)")];
        let batch = one_column("code", vec!["0012".into(), "12".into(), SqlValue::Null]);
        let out = TypeCoercer::default().coerce(batch, &schema);
        let code = out.column("code").unwrap();
        assert_eq!(code.kind, ColumnKind::Text);
        assert_eq!(
            code.values,
            vec![SqlValue::from("0012"), SqlValue::from("12"), SqlValue::Null]
        );
    }

    #[test]
    fn test_integer_with_nulls_is_nullable() {
        let schema = vec![ColumnDescriptor::new("n", "int")];
        let batch = one_column("n", vec!["1".into(), SqlValue::Null, SqlValue::Float(3.0)]);
        let out = TypeCoercer::default().coerce(batch, &schema);
        let n = out.column("n").unwrap();
        assert_eq!(n.kind, ColumnKind::NullableInt64);
        assert_eq!(n.values, vec![SqlValue::Int(1), SqlValue::Null, SqlValue::Int(3)]);
    }

    #[test]
    fn test_integer_parse_failure_widens_to_float() {
        let schema = vec![ColumnDescriptor::new("n", "bigint")];
        let batch = one_column("n", vec!["1".into(), "abc".into(), "2.5".into()]);
        let out = TypeCoercer::default().coerce(batch, &schema);
        let n = out.column("n").unwrap();
        assert_eq!(n.kind, ColumnKind::Float64);
        assert_eq!(
            n.values,
            vec![SqlValue::Float(1.0), SqlValue::Null, SqlValue::Float(2.5)]
        );
    }

    #[test]
    fn test_float_unparseable_becomes_null() {
        let schema = vec![ColumnDescriptor::new("x", "double")];
        let batch = one_column(
            "x",
            vec!["1.5".into(), "n/a".into(), SqlValue::Int(2), SqlValue::Float(f64::INFINITY)],
        );
        let out = TypeCoercer::default().coerce(batch, &schema);
        let x = out.column("x").unwrap();
        assert_eq!(x.kind, ColumnKind::Float64);
        assert_eq!(x.values[0], SqlValue::Float(1.5));
        assert_eq!(x.values[1], SqlValue::Null);
        assert_eq!(x.values[2], SqlValue::Float(2.0));
        assert_eq!(x.values[3], SqlValue::Float(f64::INFINITY));
    }

    #[test]
    fn test_boolean_tokens() {
        let schema = vec![ColumnDescriptor::new("b", "boolean")];
        let batch = one_column(
            "b",
            vec!["Yes".into(), "n".into(), "".into(), SqlValue::Int(1), "maybe".into()],
        );
        let out = TypeCoercer::default().coerce(batch, &schema);
        let b = out.column("b").unwrap();
        assert_eq!(b.kind, ColumnKind::NullableBoolean);
        assert_eq!(
            b.values,
            vec![
                SqlValue::Bool(true),
                SqlValue::Bool(false),
                SqlValue::Bool(false),
                SqlValue::Bool(true),
                SqlValue::Null
            ]
        );
    }

    #[test]
    fn test_string_null_tokens_preserved_by_default() {
        let schema = vec![ColumnDescriptor::new("s", "string")];
        let batch = one_column("s", vec!["None".into(), "null".into(), SqlValue::Null]);
        let out = TypeCoercer::default().coerce(batch, &schema);
        assert_eq!(
            out.column("s").unwrap().values,
            vec![SqlValue::from("None"), SqlValue::from("null"), SqlValue::Null]
        );
    }

    #[test]
    fn test_string_null_tokens_mapped_when_not_preserved() {
        let options = CoercionOptions {
            preserve_string_null_tokens: false,
            treat_empty_string_as_null: true,
            ..CoercionOptions::default()
        };
        let schema = vec![ColumnDescriptor::new("s", "string")];
        let batch = one_column(
            "s",
            vec!["NULL".into(), "<NA>".into(), "".into(), "nullable".into()],
        );
        let out = TypeCoercer::new(options).coerce(batch, &schema);
        assert_eq!(
            out.column("s").unwrap().values,
            vec![SqlValue::Null, SqlValue::Null, SqlValue::Null, SqlValue::from("nullable")]
        );
    }

    #[test]
    fn test_case_sensitive_tokens() {
        let options = CoercionOptions {
            preserve_string_null_tokens: false,
            string_null_tokens_case_insensitive: false,
            ..CoercionOptions::default()
        };
        let schema = vec![ColumnDescriptor::new("s", "string")];
        let batch = one_column("s", vec!["NULL".into(), "null".into()]);
        let out = TypeCoercer::new(options).coerce(batch, &schema);
        assert_eq!(
            out.column("s").unwrap().values,
            vec![SqlValue::from("NULL"), SqlValue::Null]
        );
    }

    #[test]
    fn test_temporal_and_unknown_pass_through() {
        let schema = vec![
            ColumnDescriptor::new("d", "datetime"),
            ColumnDescriptor::new("g", "geography"),
        ];
        let batch = RowBatch::from_rows(
            &names(&["d", "g"]),
            vec![vec!["2024-01-01 00:00:00".into(), "POINT(1 2)".into()]],
        )
        .unwrap();
        let out = TypeCoercer::default().coerce(batch, &schema);
        assert_eq!(out.column("d").unwrap().kind, ColumnKind::Temporal);
        assert_eq!(out.value("d", 0), Some(&SqlValue::from("2024-01-01 00:00:00")));
        assert_eq!(out.column("g").unwrap().kind, ColumnKind::Raw);
    }

    #[test]
    fn test_bad_column_kept_raw() {
        let schema = vec![
            ColumnDescriptor::new("n", "bigint"),
            ColumnDescriptor::new("s", "string"),
        ];
        let batch = RowBatch::from_rows(
            &names(&["n", "s"]),
            vec![vec![SqlValue::List(vec![SqlValue::Int(1)]), "x".into()]],
        )
        .unwrap();
        let out = TypeCoercer::default().coerce(batch, &schema);
        assert_eq!(out.column("n").unwrap().kind, ColumnKind::Raw);
        assert_eq!(out.column("s").unwrap().kind, ColumnKind::Text);
    }

    #[test]
    fn test_undeclared_columns_kept() {
        let batch = one_column("extra", vec!["1".into()]);
        let out = TypeCoercer::default().coerce(batch, &[]);
        assert_eq!(out.column("extra").unwrap().kind, ColumnKind::Raw);
    }

    #[test]
    fn test_basic_cleanup_strips_infinities() {
        let batch = one_column(
            "x",
            vec![SqlValue::Float(f64::NEG_INFINITY), SqlValue::Float(1.0)],
        );
        let out = basic_cleanup(batch);
        assert_eq!(out.column("x").unwrap().values, vec![SqlValue::Null, SqlValue::Float(1.0)]);
    }
}
