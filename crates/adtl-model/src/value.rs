//! Helpers over JSON values shared by the evaluator and the aggregator.
//!
//! Rows and evaluated values are plain `serde_json` values. These helpers
//! define the few places where the interpreter needs its own notion of
//! equality, ordering, truthiness and text rendering.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

/// A source or output row: field name to value.
pub type Row = Map<String, Value>;

/// `true` for null and the empty string, the two "no data" markers.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Truthiness: null, `false`, zero, and empty strings/lists/objects are false-like.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value as text. Strings are returned without quotes, null as "".
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key used to look a scalar value up in a `values` mapping.
///
/// Lists and objects never match a mapping key.
pub fn lookup_key(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        other => Some(to_text(other)),
    }
}

/// Equality with numbers compared by magnitude, so `2 == 2.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// Natural ordering between two values of the same kind.
///
/// Numbers order numerically, strings lexicographically, booleans with
/// `false < true`. Values of different kinds are incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Flatten nested lists into a single sequence.
pub fn flatten(values: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) => out.extend(flatten(items)),
            other => out.push(other),
        }
    }
    out
}

/// Remove duplicates, keeping the first occurrence of each value.
pub fn dedupe(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !out.iter().any(|seen| values_equal(seen, &value)) {
            out.push(value);
        }
    }
    out
}

/// Drop null-valued attributes from an output row.
pub fn remove_null_keys(mut row: Row) -> Row {
    row.retain(|_, value| !value.is_null());
    row
}

/// Wrap a float, mapping NaN and infinities to null.
pub fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Interpret a value as a float: numbers directly, strings by parsing.
pub fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_magnitude() {
        assert!(values_equal(&json!(2), &json!(2.0)));
        assert!(!values_equal(&json!("2"), &json!(2)));
        assert_eq!(
            compare_values(&json!(10), &json!(9.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_values(&json!("a"), &json!(1)), None);
    }

    #[test]
    fn false_like_values() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([])] {
            assert!(!is_truthy(&value), "{value} should be false-like");
        }
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(2)));
    }

    #[test]
    fn flatten_nested_lists() {
        let flat = flatten(vec![
            json!(12),
            json!(["13", "14"]),
            json!([[15], ["sixteen"]]),
        ]);
        assert_eq!(flat, vec![json!(12), json!("13"), json!("14"), json!(15), json!("sixteen")]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let values = dedupe(vec![json!(2), json!(1), json!(2.0), json!(1)]);
        assert_eq!(values, vec![json!(2), json!(1)]);
    }

    #[test]
    fn text_rendering() {
        assert_eq!(to_text(&json!("x")), "x");
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!(1.5)), "1.5");
        assert_eq!(lookup_key(&json!([1])), None);
    }
}
