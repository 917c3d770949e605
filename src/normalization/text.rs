use serde_json::Value;

/// Render a raw field as normalized text.
///
/// Absent and `null` fields become the empty string. Other values go through
/// [`value_text`]. The result is trimmed and every run of whitespace collapses
/// to a single space.
pub fn norm_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(other) => collapse_whitespace(&value_text(other)),
    }
}

/// Text form of a JSON value, printed the way Python's `str()` prints the
/// equivalent object. Review ids are hashed over this text, so it must not
/// drift.
///
/// Strings are verbatim. Booleans render as `True`/`False` and `null` as
/// `None`. Lists and objects use Python literal syntax with single-quoted
/// strings, e.g. `['a', 'b']` and `{'k': 1}`.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            push_literal(&mut out, other);
            out
        }
    }
}

fn push_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !(n.is_i64() || n.is_u64()) => out.push_str(&float_text(f)),
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => push_quoted(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                push_literal(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                push_quoted(out, key);
                out.push_str(": ");
                push_literal(out, item);
            }
            out.push('}');
        }
    }
}

// shortest round-trip digits; exponent form outside [1e-4, 1e16)
fn float_text(f: f64) -> String {
    if !f.is_finite() {
        return match f {
            f if f.is_nan() => "nan".into(),
            f if f > 0.0 => "inf".into(),
            _ => "-inf".into(),
        };
    }
    let magnitude = f.abs();
    if f == 0.0 || (1e-4..1e16).contains(&magnitude) {
        if f.fract() == 0.0 {
            return format!("{f:.1}");
        }
        return f.to_string();
    }
    let sci = format!("{f:e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or_default();
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => sci,
    }
}

fn push_quoted(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (0x7f..=0xa0).contains(&(c as u32)) => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for word in input.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Parse a loosely formatted price into a float.
///
/// Lists contribute their first element. Ranges such as `"19.99-24.99"` keep
/// the lower bound. Currency symbols, thousands separators and other noise are
/// stripped before parsing. Anything unparseable yields `None`.
pub fn norm_price(value: Option<&Value>) -> Option<f64> {
    let value = match value? {
        Value::Null => return None,
        Value::Array(items) => items.first()?,
        other => other,
    };

    let text = norm_text(Some(value));
    if text.is_empty() {
        return None;
    }

    let lower_bound = text.split('-').next().unwrap_or_default();
    let digits: String = lower_bound
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}

/// Whether a value carries content, following JSON "truthiness".
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
