//! Per-batch application of a mapping plan.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::core::{ColumnData, ColumnKind, RowBatch, SqlValue};
use crate::error::{MigrateError, Result};

use super::template::{FormatTemplate, Placeholder};
use super::{arg_int, arg_text, literal_value, ComputedColumn, ComputedFunc, MappingPlan};

/// Applies a mapping plan to batches.
///
/// Steps run in a fixed order: include, exclude, rename, computed columns
/// (which see renamed names), defaults for null cells, then reordering.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    plan: MappingPlan,
    funcs: IndexMap<String, ComputedFunc>,
    templates: IndexMap<String, std::result::Result<FormatTemplate, String>>,
}

impl RowTransformer {
    pub fn new(plan: MappingPlan) -> Result<Self> {
        let mut funcs = IndexMap::new();
        let mut templates = IndexMap::new();
        let mut unknown = Vec::new();

        for (target, computed) in &plan.computed {
            match ComputedFunc::parse(&computed.func) {
                Some(func) => {
                    if func == ComputedFunc::Format {
                        let template = computed.args.first().map(arg_text).unwrap_or_default();
                        templates.insert(target.clone(), FormatTemplate::parse(&template));
                    }
                    funcs.insert(target.clone(), func);
                }
                None => unknown.push(format!(
                    "computed '{}': unknown function '{}'",
                    target, computed.func
                )),
            }
        }
        if !unknown.is_empty() {
            return Err(MigrateError::MappingValidation(unknown));
        }

        Ok(Self {
            plan,
            funcs,
            templates,
        })
    }

    pub fn plan(&self) -> &MappingPlan {
        &self.plan
    }

    /// Transform one batch.
    pub fn apply(&self, mut batch: RowBatch) -> Result<RowBatch> {
        let plan = &self.plan;

        if !plan.include.is_empty() {
            batch.retain_columns(|c| plan.is_included(&c.name));
        }
        batch.retain_columns(|c| !plan.is_excluded(&c.name));

        for col in batch.columns_mut() {
            if let Some(target) = plan.rename_target(&col.name) {
                col.name = target.to_string();
            }
        }

        let now = Utc::now();
        for (target, computed) in &plan.computed {
            let Some(func) = self.funcs.get(target) else {
                continue;
            };
            let column = self.evaluate(target, *func, computed, &batch, now);
            batch.put(column)?;
        }

        for (target, literal) in &plan.defaults {
            let fill = literal_value(literal);
            if fill.is_null() {
                continue;
            }
            if let Some(col) = batch.column_mut(target) {
                let mut filled = 0;
                for v in col.values.iter_mut().filter(|v| v.is_null()) {
                    *v = fill.clone();
                    filled += 1;
                }
                if filled > 0 {
                    debug!("Filled {} null cells of {} with mapping default", filled, target);
                }
            }
        }

        if !plan.order.is_empty() {
            batch.move_to_front(&plan.order);
        }
        Ok(batch)
    }

    fn evaluate(
        &self,
        target: &str,
        func: ComputedFunc,
        computed: &ComputedColumn,
        batch: &RowBatch,
        now: DateTime<Utc>,
    ) -> ColumnData {
        let rows = batch.num_rows();
        let args = &computed.args;

        match func {
            ComputedFunc::Now => ColumnData::new(
                target,
                ColumnKind::Temporal,
                vec![SqlValue::Timestamp(now); rows],
            ),
            ComputedFunc::Concat => {
                let values = (0..rows)
                    .map(|row| {
                        let text: String = args
                            .iter()
                            .map(|arg| match column_ref(batch, arg) {
                                Some(col) => col.values[row].to_text().unwrap_or_default(),
                                None => arg_text(arg),
                            })
                            .collect();
                        SqlValue::Text(text)
                    })
                    .collect();
                ColumnData::new(target, ColumnKind::Text, values)
            }
            ComputedFunc::Upper | ComputedFunc::Lower => {
                let upper = func == ComputedFunc::Upper;
                let values = match args.first().and_then(|a| column_ref(batch, a)) {
                    Some(col) => col
                        .values
                        .iter()
                        .map(|v| match v.to_text() {
                            Some(s) if upper => SqlValue::Text(s.to_uppercase()),
                            Some(s) => SqlValue::Text(s.to_lowercase()),
                            None => SqlValue::Null,
                        })
                        .collect(),
                    None => {
                        warn!("computed '{}': source column not in batch, emitting nulls", target);
                        vec![SqlValue::Null; rows]
                    }
                };
                ColumnData::new(target, ColumnKind::Text, values)
            }
            ComputedFunc::Substr => {
                let start = args.get(1).and_then(arg_int).unwrap_or(0).max(0) as usize;
                let length = args.get(2).and_then(arg_int).map(|n| n.max(0) as usize);
                let values = match args.first().and_then(|a| column_ref(batch, a)) {
                    Some(col) => col
                        .values
                        .iter()
                        .map(|v| match v.to_text() {
                            Some(s) => {
                                let tail = s.chars().skip(start);
                                SqlValue::Text(match length {
                                    Some(n) => tail.take(n).collect(),
                                    None => tail.collect(),
                                })
                            }
                            None => SqlValue::Null,
                        })
                        .collect(),
                    None => {
                        warn!("computed '{}': source column not in batch, emitting nulls", target);
                        vec![SqlValue::Null; rows]
                    }
                };
                ColumnData::new(target, ColumnKind::Text, values)
            }
            ComputedFunc::Format => self.evaluate_format(target, args, batch),
        }
    }

    fn evaluate_format(&self, target: &str, args: &[JsonValue], batch: &RowBatch) -> ColumnData {
        let rows = batch.num_rows();
        let template = match self.templates.get(target) {
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                warn!("computed '{}': template does not parse ({}), rendering empty", target, e);
                return ColumnData::new(target, ColumnKind::Text, vec![SqlValue::from(""); rows]);
            }
            None => {
                return ColumnData::new(target, ColumnKind::Text, vec![SqlValue::from(""); rows])
            }
        };
        let positional = &args[args.len().min(1)..];

        let mut failures = 0usize;
        let values = (0..rows)
            .map(|row| {
                let rendered = template.render(|p| match p {
                    Placeholder::Named(name) => batch.value(name, row).cloned(),
                    Placeholder::Positional(i) => positional.get(*i).map(|arg| {
                        match column_ref(batch, arg) {
                            Some(col) => col.values[row].clone(),
                            None => literal_value(arg),
                        }
                    }),
                });
                match rendered {
                    Ok(s) => SqlValue::Text(s),
                    Err(e) => {
                        if failures == 0 {
                            debug!("computed '{}': row {} failed to render: {}", target, row, e);
                        }
                        failures += 1;
                        SqlValue::from("")
                    }
                }
            })
            .collect();

        if failures > 0 {
            warn!(
                "computed '{}': {} row(s) failed to render and were left empty",
                target, failures
            );
        }
        ColumnData::new(target, ColumnKind::Text, values)
    }
}

/// The batch column an argument names, if it names one.
fn column_ref<'b>(batch: &'b RowBatch, arg: &JsonValue) -> Option<&'b ColumnData> {
    match arg {
        JsonValue::String(name) => batch.column(name),
        _ => None,
    }
}
