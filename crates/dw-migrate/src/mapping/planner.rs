//! Mapping plan validation and preparation.
//!
//! Validation is strict and runs before any destination table is touched.
//! Preparation is permissive and produces the column list used both for
//! table creation and for every batch transform.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::core::{ColumnDescriptor, ColumnMode, DestinationColumn, TypeMapper};
use crate::error::{MigrateError, Result};
use crate::typemap::map_schema;

use super::template::FormatTemplate;
use super::{arg_int, ComputedColumn, ComputedFunc, MappingPlan};

/// Output of [`prepare`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMapping {
    /// Destination-side columns, post-rename, computed placeholders included, in final order.
    pub columns: Vec<ColumnDescriptor>,
    /// Target name -> destination type.
    pub type_overrides: IndexMap<String, String>,
    /// Final column order by target name.
    pub order: Vec<String>,
}

impl PreparedMapping {
    /// Map the prepared columns and apply type overrides.
    pub fn destination_columns(&self, mapper: &dyn TypeMapper) -> Result<Vec<DestinationColumn>> {
        let mut columns = map_schema(mapper, &self.columns)?;
        for col in &mut columns {
            let over = self
                .type_overrides
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&col.name));
            if let Some((_, ty)) = over {
                debug!("Column {}: type override {} -> {}", col.name, col.data_type, ty);
                col.data_type = ty.clone();
                col.mode = ColumnMode::Nullable;
                col.subfields.clear();
            }
        }
        Ok(columns)
    }
}

/// Check a plan against the source schema. Every problem is reported in one error.
pub fn validate(plan: &MappingPlan, source_columns: &[ColumnDescriptor]) -> Result<()> {
    let data_columns: Vec<&ColumnDescriptor> =
        source_columns.iter().filter(|c| !c.is_partition).collect();
    let exists = |name: &str| data_columns.iter().any(|c| c.name.eq_ignore_ascii_case(name));
    let is_partition = |name: &str| {
        source_columns
            .iter()
            .any(|c| c.is_partition && c.name.eq_ignore_ascii_case(name))
    };
    let missing = |role: &str, name: &str| {
        if is_partition(name) {
            format!("{} column '{}' is a partition column", role, name)
        } else {
            format!("{} column '{}' not found in source", role, name)
        }
    };
    let mut problems = Vec::new();

    for name in &plan.include {
        if !exists(name) {
            problems.push(missing("include", name));
        }
    }

    let mut targets: HashSet<String> = HashSet::new();
    for (src, target) in &plan.rename {
        if !exists(src) {
            problems.push(missing("rename source", src));
        }
        if target.trim().is_empty() {
            problems.push(format!("rename of '{}' has an empty target", src));
        } else if !targets.insert(target.to_lowercase()) {
            problems.push(format!("duplicate rename target '{}'", target));
        }
    }

    // Names a named format placeholder may refer to.
    let mut known: HashSet<&str> = source_columns.iter().map(|c| c.name.as_str()).collect();
    known.extend(plan.rename.values().map(String::as_str));
    known.extend(plan.computed.keys().map(String::as_str));

    for (target, computed) in &plan.computed {
        validate_computed(target, computed, &known, &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::MappingValidation(problems))
    }
}

fn validate_computed(
    target: &str,
    computed: &ComputedColumn,
    known: &HashSet<&str>,
    problems: &mut Vec<String>,
) {
    let Some(func) = ComputedFunc::parse(&computed.func) else {
        problems.push(format!(
            "computed '{}': function '{}' is not one of {}",
            target,
            computed.func,
            ComputedFunc::ALLOWED.join(", ")
        ));
        return;
    };

    let args = &computed.args;
    match func {
        ComputedFunc::Concat if args.is_empty() => {
            problems.push(format!("computed '{}': concat needs at least one argument", target));
        }
        ComputedFunc::Upper | ComputedFunc::Lower if args.len() != 1 => {
            problems.push(format!(
                "computed '{}': {} takes exactly one column",
                target, computed.func
            ));
        }
        ComputedFunc::Substr => {
            if !(2..=3).contains(&args.len()) {
                problems.push(format!(
                    "computed '{}': substr takes (column, start, length?)",
                    target
                ));
            } else if args[1..].iter().any(|a| arg_int(a).map_or(true, |n| n < 0)) {
                problems.push(format!(
                    "computed '{}': substr start and length must be non-negative integers",
                    target
                ));
            }
        }
        ComputedFunc::Now if !args.is_empty() => {
            problems.push(format!("computed '{}': now takes no arguments", target));
        }
        ComputedFunc::Format => validate_format(target, args, known, problems),
        _ => {}
    }
}

fn validate_format(
    target: &str,
    args: &[JsonValue],
    known: &HashSet<&str>,
    problems: &mut Vec<String>,
) {
    let Some(JsonValue::String(template)) = args.first() else {
        problems.push(format!(
            "computed '{}': format needs a template string as first argument",
            target
        ));
        return;
    };
    // Positional form: extra args are column-or-literal, never checked.
    if args.len() > 1 {
        return;
    }
    match FormatTemplate::parse(template) {
        Ok(parsed) => {
            for field in parsed.named_fields() {
                if !known.contains(field) {
                    problems.push(format!(
                        "computed '{}': format placeholder '{{{}}}' does not match any column",
                        target, field
                    ));
                }
            }
        }
        Err(e) => warn!(
            "computed '{}': template '{}' does not parse ({}); rows will render empty",
            target, template, e
        ),
    }
}

/// Resolve the plan against the source schema.
pub fn prepare(plan: &MappingPlan, source_columns: &[ColumnDescriptor]) -> PreparedMapping {
    let mut columns: Vec<ColumnDescriptor> = source_columns
        .iter()
        .filter(|c| !c.is_partition)
        .filter(|c| plan.is_included(&c.name))
        .filter(|c| !plan.is_excluded(&c.name))
        .cloned()
        .collect();

    for col in &mut columns {
        if let Some(target) = plan.rename_target(&col.name) {
            col.name = target.to_string();
        }
    }

    // A computed target matching a column ignoring case replaces that column
    // under its existing name, the same way the transformer writes it.
    for (target, computed) in &plan.computed {
        let computed_type = match ComputedFunc::parse(&computed.func) {
            Some(ComputedFunc::Now) => "timestamp",
            _ => "string",
        };
        match columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(target)) {
            Some(existing) => existing.source_type = computed_type.to_string(),
            None => columns.push(
                ColumnDescriptor::new(target.clone(), computed_type)
                    .with_comment(format!("computed: {}", computed.func)),
            ),
        }
    }

    let mut ordered = Vec::with_capacity(columns.len());
    for name in &plan.order {
        if let Some(i) = columns.iter().position(|c| &c.name == name) {
            ordered.push(columns.remove(i));
        }
    }
    ordered.append(&mut columns);

    PreparedMapping {
        order: ordered.iter().map(|c| c.name.clone()).collect(),
        columns: ordered,
        type_overrides: plan.type_override.clone(),
    }
}
