//! Declarative column mapping: plan types, validation, preparation and the
//! per-batch row transform.

mod planner;
mod template;
mod transform;

pub use planner::{prepare, validate, PreparedMapping};
pub use template::{FormatTemplate, Placeholder};
pub use transform::RowTransformer;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::core::SqlValue;

/// User-supplied column mapping for one table.
///
/// Map fields keep their declaration order: computed columns are evaluated
/// in that order and may reference computed columns declared before them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingPlan {
    /// Source columns to keep; empty keeps all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Source columns to drop.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Source name -> target name.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub rename: IndexMap<String, String>,

    /// Target name -> destination type.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub type_override: IndexMap<String, String>,

    /// Target name -> computed expression.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub computed: IndexMap<String, ComputedColumn>,

    /// Target name -> literal used for null cells.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub defaults: IndexMap<String, JsonValue>,

    /// Target names moved to the front, in this order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
}

impl MappingPlan {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.rename.is_empty()
            && self.type_override.is_empty()
            && self.computed.is_empty()
            && self.defaults.is_empty()
            && self.order.is_empty()
    }

    /// Layer `other` on top of this plan: non-empty lists replace, maps merge by key.
    pub fn overlay(&self, other: &MappingPlan) -> MappingPlan {
        fn list(base: &[String], top: &[String]) -> Vec<String> {
            if top.is_empty() {
                base.to_vec()
            } else {
                top.to_vec()
            }
        }
        fn merge<V: Clone>(base: &IndexMap<String, V>, top: &IndexMap<String, V>) -> IndexMap<String, V> {
            let mut out = base.clone();
            for (k, v) in top {
                out.insert(k.clone(), v.clone());
            }
            out
        }

        MappingPlan {
            include: list(&self.include, &other.include),
            exclude: list(&self.exclude, &other.exclude),
            rename: merge(&self.rename, &other.rename),
            type_override: merge(&self.type_override, &other.type_override),
            computed: merge(&self.computed, &other.computed),
            defaults: merge(&self.defaults, &other.defaults),
            order: list(&self.order, &other.order),
        }
    }

    /// Rename target for a source column, matched case-insensitively. First match wins.
    pub fn rename_target(&self, source_name: &str) -> Option<&str> {
        self.rename
            .iter()
            .find(|(src, _)| src.eq_ignore_ascii_case(source_name))
            .map(|(_, target)| target.as_str())
    }

    pub fn is_included(&self, name: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|i| i.eq_ignore_ascii_case(name))
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|e| e.eq_ignore_ascii_case(name))
    }
}

/// A computed column: function name plus arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedColumn {
    pub func: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
}

impl ComputedColumn {
    pub fn new(func: impl Into<String>, args: Vec<JsonValue>) -> Self {
        Self {
            func: func.into(),
            args,
        }
    }
}

/// Allow-listed computed functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedFunc {
    Concat,
    Upper,
    Lower,
    Substr,
    Now,
    Format,
}

impl ComputedFunc {
    pub const ALLOWED: [&'static str; 6] = ["concat", "upper", "lower", "substr", "now", "format"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "concat" => Some(ComputedFunc::Concat),
            "upper" => Some(ComputedFunc::Upper),
            "lower" => Some(ComputedFunc::Lower),
            "substr" => Some(ComputedFunc::Substr),
            "now" => Some(ComputedFunc::Now),
            "format" => Some(ComputedFunc::Format),
            _ => None,
        }
    }
}

/// Text form of an argument: strings as-is, other scalars via their JSON rendering.
pub(crate) fn arg_text(arg: &JsonValue) -> String {
    match arg {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Integer form of an argument (`2`, `2.0`, `"2"`).
pub(crate) fn arg_int(arg: &JsonValue) -> Option<i64> {
    match arg {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Cell value for a literal from the plan.
pub(crate) fn literal_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        JsonValue::Array(items) => SqlValue::List(items.iter().map(literal_value).collect()),
        JsonValue::Object(map) => SqlValue::Map(
            map.iter()
                .map(|(k, v)| (SqlValue::Text(k.clone()), literal_value(v)))
                .collect(),
        ),
    }
}
