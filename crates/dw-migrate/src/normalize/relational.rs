//! Relational destination: column reconciliation, declared defaults and
//! the non-nullable policy.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::NullPolicy;
use crate::core::{base_type, ColumnKind, DestinationColumn, RowBatch, SqlValue};
use crate::error::{MigrateError, Result};

use super::analytical::flatten_composites;
use super::defaults::parse_default;

/// Strip infinities and flatten composite values to JSON text.
pub fn normalize(mut batch: RowBatch) -> RowBatch {
    for col in batch.columns_mut() {
        for v in col.values.iter_mut() {
            if matches!(v, SqlValue::Float(f) if f.is_infinite()) {
                *v = SqlValue::Null;
            }
        }
        if col.has_composite() {
            debug!("Column {}: composite values written as JSON text", col.name);
            flatten_composites(col);
        }
    }
    batch
}

/// Drop columns whose name repeats an earlier one (case-insensitive).
pub fn dedupe_columns(columns: &[DestinationColumn]) -> Vec<DestinationColumn> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        if seen.insert(col.name.to_lowercase()) {
            out.push(col.clone());
        } else {
            warn!(
                "Dropping duplicate column {} ({}) from table definition",
                col.name, col.data_type
            );
        }
    }
    out
}

/// Filter and reorder a batch to the destination's actual columns.
///
/// Batch columns match destination columns case-insensitively and take the
/// destination's spelling. Batch columns the destination lacks are dropped.
pub fn reconcile_columns(mut batch: RowBatch, destination: &[DestinationColumn]) -> RowBatch {
    let mut order = Vec::with_capacity(destination.len());
    for dest in destination {
        if let Some(i) = batch.position_ignore_case(&dest.name) {
            batch.columns_mut()[i].name = dest.name.clone();
            order.push(dest.name.clone());
        }
    }
    let before = batch.num_columns();
    batch.select(&order);
    if batch.num_columns() < before {
        debug!(
            "Dropped {} batch columns not present in destination",
            before - batch.num_columns()
        );
    }
    batch
}

/// Fill null cells of non-nullable columns from their declared defaults.
/// Returns the number of cells filled.
pub fn fill_declared_defaults(batch: &mut RowBatch, destination: &[DestinationColumn]) -> usize {
    let mut filled = 0;
    for dest in destination.iter().filter(|d| !d.nullable) {
        let Some(literal) = dest.default.as_deref() else {
            continue;
        };
        let Some(col) = batch.column_mut(&dest.name) else {
            continue;
        };
        if col.null_count() == 0 {
            continue;
        }
        let Some(value) = parse_default(literal, &dest.data_type) else {
            warn!(
                "Column {}: declared default '{}' is not usable for {}",
                dest.name, literal, dest.data_type
            );
            continue;
        };
        let mut n = 0;
        for v in col.values.iter_mut().filter(|v| v.is_null()) {
            *v = value.clone();
            n += 1;
        }
        if col.kind == ColumnKind::NullableInt64 && matches!(value, SqlValue::Int(_)) {
            col.kind = ColumnKind::Int64;
        }
        debug!("Column {}: {} nulls filled with default {}", dest.name, n, literal);
        filled += n;
    }
    filled
}

/// Apply the null policy to the remaining nulls in non-nullable columns.
pub fn enforce_null_policy(
    mut batch: RowBatch,
    table: &str,
    destination: &[DestinationColumn],
    policy: NullPolicy,
    sentinel: Option<&str>,
) -> Result<RowBatch> {
    let required: Vec<&DestinationColumn> = destination
        .iter()
        .filter(|d| !d.nullable && batch.column(&d.name).is_some())
        .collect();
    let violations = null_counts(&batch, &required);
    if violations.is_empty() {
        return Ok(batch);
    }

    match policy {
        NullPolicy::Fail => Err(MigrateError::NonNullableViolation {
            table: table.to_string(),
            violations,
        }),
        NullPolicy::Fill => {
            // Without a sentinel only declared defaults fill, and those already ran.
            let sentinel = sentinel.unwrap_or_default();
            let fillable = required
                .iter()
                .filter(|d| !sentinel.is_empty() && accepts_sentinel(&d.data_type));
            for dest in fillable {
                if let Some(col) = batch.column_mut(&dest.name) {
                    let mut n = 0;
                    for v in col.values.iter_mut().filter(|v| v.is_null()) {
                        *v = SqlValue::Text(sentinel.to_string());
                        n += 1;
                    }
                    if n > 0 {
                        warn!("Column {}: {} nulls filled with '{}'", dest.name, n, sentinel);
                    }
                }
            }
            let remaining = null_counts(&batch, &required);
            if remaining.is_empty() {
                Ok(batch)
            } else {
                Err(MigrateError::NonNullableViolation {
                    table: table.to_string(),
                    violations: remaining,
                })
            }
        }
        NullPolicy::Skip => {
            let mask: Vec<bool> = (0..batch.num_rows())
                .map(|row| {
                    required.iter().all(|d| {
                        batch
                            .value(&d.name, row)
                            .map_or(true, |v| !v.is_null())
                    })
                })
                .collect();
            let dropped = batch.retain_rows(&mask);
            warn!(
                "Dropped {} rows of {} with nulls in non-nullable columns",
                dropped, table
            );
            Ok(batch)
        }
    }
}

fn null_counts(batch: &RowBatch, required: &[&DestinationColumn]) -> Vec<(String, usize)> {
    required
        .iter()
        .filter_map(|d| {
            let nulls = batch.column(&d.name)?.null_count();
            (nulls > 0).then(|| (d.name.clone(), nulls))
        })
        .collect()
}

/// Textual and temporal columns may take a string sentinel; numeric ones never do.
fn accepts_sentinel(data_type: &str) -> bool {
    matches!(
        base_type(data_type).as_str(),
        "char"
            | "varchar"
            | "text"
            | "tinytext"
            | "mediumtext"
            | "longtext"
            | "enum"
            | "set"
            | "date"
            | "datetime"
            | "timestamp"
            | "time"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnData;

    fn schema() -> Vec<DestinationColumn> {
        vec![
            DestinationColumn::new("id", "bigint").not_null(),
            DestinationColumn::new("status_code", "varchar(16)").not_null(),
            DestinationColumn::new("note", "text"),
        ]
    }

    fn batch() -> RowBatch {
        RowBatch::new(vec![
            ColumnData::new(
                "id",
                ColumnKind::NullableInt64,
                vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)],
            ),
            ColumnData::new(
                "status_code",
                ColumnKind::Text,
                vec!["007".into(), SqlValue::Null, "010".into()],
            ),
            ColumnData::new("note", ColumnKind::Text, vec![SqlValue::Null; 3]),
        ])
        .unwrap()
    }

    #[test]
    fn test_dedupe_first_wins() {
        let cols = vec![
            DestinationColumn::new("Code", "varchar(8)"),
            DestinationColumn::new("id", "bigint"),
            DestinationColumn::new("code", "text"),
        ];
        let out = dedupe_columns(&cols);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Code");
        assert_eq!(out[0].data_type, "varchar(8)");
    }

    #[test]
    fn test_reconcile_filters_and_reorders() {
        let b = RowBatch::new(vec![
            ColumnData::raw("extra", vec![SqlValue::Int(1)]),
            ColumnData::raw("NOTE", vec!["n".into()]),
            ColumnData::raw("id", vec![SqlValue::Int(1)]),
        ])
        .unwrap();
        let out = reconcile_columns(b, &schema());
        assert_eq!(out.column_names(), vec!["id", "note"]);
    }

    #[test]
    fn test_skip_drops_violating_rows() {
        let out = enforce_null_policy(batch(), "t", &schema(), NullPolicy::Skip, None).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(
            out.column("status_code").unwrap().values,
            vec![SqlValue::from("007"), SqlValue::from("010")]
        );
        assert_eq!(out.column("note").unwrap().len(), 2);
    }

    #[test]
    fn test_fail_reports_counts() {
        let err = enforce_null_policy(batch(), "t", &schema(), NullPolicy::Fail, None).unwrap_err();
        match err {
            MigrateError::NonNullableViolation { table, violations } => {
                assert_eq!(table, "t");
                assert_eq!(violations, vec![("status_code".to_string(), 1)]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_fill_applies_sentinel_to_text_only() {
        let out =
            enforce_null_policy(batch(), "t", &schema(), NullPolicy::Fill, Some("N/A")).unwrap();
        assert_eq!(out.value("status_code", 1), Some(&SqlValue::from("N/A")));
        // nullable columns are untouched
        assert_eq!(out.value("note", 0), Some(&SqlValue::Null));

        let mut numeric = batch();
        numeric.column_mut("id").unwrap().values[0] = SqlValue::Null;
        let err = enforce_null_policy(numeric, "t", &schema(), NullPolicy::Fill, Some("N/A"))
            .unwrap_err();
        match err {
            MigrateError::NonNullableViolation { violations, .. } => {
                assert_eq!(violations, vec![("id".to_string(), 1)]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_fill_without_sentinel_reports_remaining_nulls() {
        let err = enforce_null_policy(batch(), "t", &schema(), NullPolicy::Fill, None).unwrap_err();
        match err {
            MigrateError::NonNullableViolation { table, violations } => {
                assert_eq!(table, "t");
                assert_eq!(violations, vec![("status_code".to_string(), 1)]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_fill_without_sentinel_relies_on_declared_defaults() {
        let dest = vec![
            DestinationColumn::new("id", "bigint").not_null(),
            DestinationColumn::new("status_code", "varchar(16)")
                .not_null()
                .with_default("'pending'"),
        ];
        let mut b = batch();
        fill_declared_defaults(&mut b, &dest);
        let out = enforce_null_policy(b, "t", &dest, NullPolicy::Fill, None).unwrap();
        assert_eq!(out.value("status_code", 1), Some(&SqlValue::from("pending")));
    }

    #[test]
    fn test_declared_defaults_fill_before_policy() {
        let dest = vec![
            DestinationColumn::new("id", "bigint").not_null().with_default("0"),
            DestinationColumn::new("status_code", "varchar(16)")
                .not_null()
                .with_default("'pending'"),
            DestinationColumn::new("note", "text").with_default("'x'"),
        ];
        let mut b = batch();
        b.column_mut("id").unwrap().values[2] = SqlValue::Null;
        let filled = fill_declared_defaults(&mut b, &dest);
        assert_eq!(filled, 2);
        assert_eq!(b.value("id", 2), Some(&SqlValue::Int(0)));
        assert_eq!(b.value("status_code", 1), Some(&SqlValue::from("pending")));
        assert_eq!(b.value("note", 0), Some(&SqlValue::Null));
        assert!(enforce_null_policy(b, "t", &dest, NullPolicy::Fail, None).is_ok());
    }

    #[test]
    fn test_normalize_flattens_composites() {
        let b = RowBatch::new(vec![ColumnData::raw(
            "attrs",
            vec![SqlValue::Map(vec![("k".into(), SqlValue::Int(1))])],
        )])
        .unwrap();
        let out = normalize(b);
        assert_eq!(out.value("attrs", 0), Some(&SqlValue::from(r#"{"k":1}"#)));
    }
}
