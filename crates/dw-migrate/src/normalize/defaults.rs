//! Typed values for declared relational column defaults.

use chrono::Utc;

use crate::coerce::parse_bool_token;
use crate::core::{base_type, SqlValue};

const NOW_FORMS: &[&str] = &["current_timestamp", "now", "localtimestamp", "localtime"];

/// Parse a declared default (as reported by the catalog) into a value for
/// a column of `data_type`. Returns `None` when there is no usable default.
pub fn parse_default(literal: &str, data_type: &str) -> Option<SqlValue> {
    let raw = literal.trim();
    if raw.is_empty() && !is_textual(data_type) {
        return None;
    }
    if raw.eq_ignore_ascii_case("null") {
        return None;
    }

    let base = base_type(data_type);

    if is_now(raw) {
        let now = Utc::now();
        return Some(match base.as_str() {
            "date" => SqlValue::Date(now.date_naive()),
            "datetime" => SqlValue::DateTime(now.naive_utc()),
            _ => SqlValue::Timestamp(now),
        });
    }

    if let Some(bits) = bit_literal(raw) {
        let n = i64::from_str_radix(bits, 2).ok()?;
        return Some(match base.as_str() {
            "bool" | "boolean" => SqlValue::Bool(n != 0),
            _ => SqlValue::Int(n),
        });
    }

    let text = unquote(raw);
    match base.as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            text.parse::<i64>().ok().map(SqlValue::Int)
        }
        "bit" => text.parse::<i64>().ok().map(SqlValue::Int),
        "decimal" | "numeric" | "float" | "double" | "real" => {
            text.parse::<f64>().ok().map(SqlValue::Float)
        }
        "bool" | "boolean" => parse_bool_token(&SqlValue::Text(text.to_string())).map(SqlValue::Bool),
        _ => Some(SqlValue::Text(text.to_string())),
    }
}

fn is_now(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    let name = lower.split('(').next().unwrap_or_default().trim();
    NOW_FORMS.contains(&name) && (lower == name || lower.ends_with(')'))
}

/// `b'101'` -> `101`
fn bit_literal(raw: &str) -> Option<&str> {
    let inner = raw
        .strip_prefix("b'")
        .or_else(|| raw.strip_prefix("B'"))?
        .strip_suffix('\'')?;
    (!inner.is_empty() && inner.chars().all(|c| c == '0' || c == '1')).then_some(inner)
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(raw)
}

fn is_textual(data_type: &str) -> bool {
    matches!(
        base_type(data_type).as_str(),
        "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set"
    )
}
