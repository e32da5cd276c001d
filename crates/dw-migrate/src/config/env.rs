//! `$VAR` / `${VAR}` placeholder expansion in configuration values.

use serde_yaml::Value;

/// Expand environment placeholders in every string of a YAML document.
pub fn expand_value(value: Value) -> Value {
    expand_value_with(value, &|name| std::env::var(name).ok())
}

pub(crate) fn expand_value_with<F>(value: Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => Value::String(expand_with(&s, lookup)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|v| expand_value_with(v, lookup))
                .collect(),
        ),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, expand_value_with(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

/// Expand `$VAR` and `${VAR}` in one string. Unset variables are left as written.
pub(crate) fn expand_with<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit()))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOST" => Some("db.internal".to_string()),
            "PW" => Some("s3cr$t".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_plain_and_braced() {
        assert_eq!(expand_with("$HOST:3306", &lookup), "db.internal:3306");
        assert_eq!(expand_with("${HOST}x", &lookup), "db.internalx");
        assert_eq!(expand_with("pw=${PW}", &lookup), "pw=s3cr$t");
    }

    #[test]
    fn test_unset_left_as_written() {
        assert_eq!(expand_with("$NOPE/${NOPE}", &lookup), "$NOPE/${NOPE}");
        assert_eq!(expand_with("cost $5", &lookup), "cost $5");
        assert_eq!(expand_with("end$", &lookup), "end$");
        assert_eq!(expand_with("${unclosed", &lookup), "${unclosed");
    }

    #[test]
    fn test_nested_values() {
        let doc: Value = serde_yaml::from_str("a: [$HOST, 1]\nb: {c: '${HOST}'}").unwrap();
        let out = expand_value_with(doc, &lookup);
        assert_eq!(out["a"][0], Value::String("db.internal".into()));
        assert_eq!(out["a"][1], Value::Number(1.into()));
        assert_eq!(out["b"]["c"], Value::String("db.internal".into()));
    }
}
