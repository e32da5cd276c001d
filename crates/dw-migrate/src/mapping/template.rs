//! `format` templates: `{name}`, `{name:02d}`, `{}`, `{:>8s}`, `{0}`.
//!
//! A `d` format spec is numeric: missing, null, NaN or non-numeric values
//! render as `0`. Every other spec renders missing values as an empty string.

use crate::core::SqlValue;

/// A field reference inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `{field}`: resolved from the row by name.
    Named(String),
    /// `{}` or `{0}`: resolved from the call's positional arguments.
    Positional(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    ty: Option<char>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field { target: Placeholder, spec: FormatSpec },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatTemplate {
    segments: Vec<Segment>,
}

impl FormatTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        let mut auto_index = 0usize;
        let mut saw_auto = false;
        let mut saw_manual = false;

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err("single '}' in template".to_string()),
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err("nested '{' in template field".to_string()),
                            Some(c) => field.push(c),
                            None => return Err("unclosed '{' in template".to_string()),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }

                    let (name, spec) = match field.split_once(':') {
                        Some((n, s)) => (n, s),
                        None => (field.as_str(), ""),
                    };
                    if name.contains(&['!', '.', '['][..]) {
                        return Err(format!("unsupported field expression '{}'", name));
                    }
                    let target = if name.is_empty() {
                        saw_auto = true;
                        auto_index += 1;
                        Placeholder::Positional(auto_index - 1)
                    } else if let Ok(idx) = name.parse::<usize>() {
                        saw_manual = true;
                        Placeholder::Positional(idx)
                    } else {
                        Placeholder::Named(name.to_string())
                    };
                    if saw_auto && saw_manual {
                        return Err("cannot mix automatic and manual field numbering".to_string());
                    }
                    segments.push(Segment::Field {
                        target,
                        spec: FormatSpec::parse(spec)?,
                    });
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Every placeholder in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { target, .. } => Some(target),
            Segment::Literal(_) => None,
        })
    }

    /// Names of the named placeholders.
    pub fn named_fields(&self) -> Vec<&str> {
        self.placeholders()
            .filter_map(|p| match p {
                Placeholder::Named(n) => Some(n.as_str()),
                Placeholder::Positional(_) => None,
            })
            .collect()
    }

    /// Render with `lookup` supplying each placeholder's value (`None` = missing).
    pub fn render<F>(&self, lookup: F) -> Result<String, String>
    where
        F: Fn(&Placeholder) -> Option<SqlValue>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field { target, spec } => {
                    out.push_str(&spec.apply(lookup(target).as_ref())?);
                }
            }
        }
        Ok(out)
    }
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, String> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if !chars.is_empty() && is_align(chars[0]) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
            out.sign = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() && chars[i] == '0' {
            out.zero = true;
            i += 1;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i > start {
            out.width = chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| format!("bad width in '{}'", spec))?;
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(format!("missing precision in '{}'", spec));
            }
            out.precision = chars[start..i].iter().collect::<String>().parse().ok();
        }
        if i < chars.len() {
            match chars[i] {
                c @ ('d' | 'f' | 'F' | 's') => out.ty = Some(c),
                c => return Err(format!("unsupported format type '{}'", c)),
            }
            i += 1;
        }
        if i != chars.len() {
            return Err(format!("invalid format spec '{}'", spec));
        }
        Ok(out)
    }

    fn is_numeric(&self) -> bool {
        matches!(self.ty, Some('d' | 'f' | 'F'))
    }

    fn apply(&self, value: Option<&SqlValue>) -> Result<String, String> {
        let value = value.filter(|v| !v.is_null());
        match self.ty {
            Some('d') => {
                let n = value.and_then(as_integer).unwrap_or(0);
                let sign = self.sign_prefix(n < 0);
                Ok(self.pad(&n.unsigned_abs().to_string(), &sign, true))
            }
            Some('f' | 'F') => match value {
                None => Ok(self.pad("", "", false)),
                Some(v) => {
                    let f = as_float(v).ok_or_else(|| {
                        format!("cannot format {} value as float", v.kind_name())
                    })?;
                    let body = format!("{:.*}", self.precision.unwrap_or(6), f.abs());
                    let sign = self.sign_prefix(f.is_sign_negative() && f != 0.0);
                    Ok(self.pad(&body, &sign, true))
                }
            },
            _ => {
                let mut text = value.and_then(SqlValue::to_text).unwrap_or_default();
                if let Some(p) = self.precision {
                    text = text.chars().take(p).collect();
                }
                Ok(self.pad(&text, "", false))
            }
        }
    }

    fn sign_prefix(&self, negative: bool) -> String {
        match (negative, self.sign) {
            (true, _) => "-".to_string(),
            (false, Some('+')) => "+".to_string(),
            (false, Some(' ')) => " ".to_string(),
            _ => String::new(),
        }
    }

    fn pad(&self, body: &str, sign: &str, numeric: bool) -> String {
        let len = sign.chars().count() + body.chars().count();
        if len >= self.width {
            return format!("{}{}", sign, body);
        }
        let missing = self.width - len;
        let zero_pad = self.zero && self.fill.is_none() && self.is_numeric() && numeric;
        let fill = self.fill.unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(if zero_pad {
            '='
        } else if numeric {
            '>'
        } else {
            '<'
        });
        let run = |n: usize| fill.to_string().repeat(n);
        match align {
            '<' => format!("{}{}{}", sign, body, run(missing)),
            '^' => format!(
                "{}{}{}{}",
                run(missing / 2),
                sign,
                body,
                run(missing - missing / 2)
            ),
            '=' => format!("{}{}{}", sign, run(missing), body),
            _ => format!("{}{}{}", run(missing), sign, body),
        }
    }
}

fn as_integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Int(i) => Some(*i),
        SqlValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn as_float(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Int(i) => Some(*i as f64),
        SqlValue::Float(f) => Some(*f),
        SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}
