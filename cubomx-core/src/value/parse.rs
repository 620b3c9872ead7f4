//! Value Parser: attribute strings to typed values.

use super::Value;

/// Convert a raw attribute or text string into a typed value.
///
/// `true`/`false`, `null` and `undefined` map to their literals. Text that
/// parses as a finite decimal number becomes a number. Anything else, the
/// empty string included, stays a string and is not trimmed.
pub fn parse_attribute(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        "undefined" => return Value::Undefined,
        _ => {}
    }
    let trimmed = raw.trim();
    if looks_numeric(trimmed) {
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return Value::Number(n);
            }
        }
    }
    Value::string(raw)
}

/// Rust's float parser accepts `inf`, `NaN` and friends; attribute text
/// only counts as numeric when it is made of digits, sign, point and exponent.
fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}
