//! Numeric coercion of evaluated strings.

use adtl_model::value::float_value;
use serde_json::Value;

/// Parse a string as an integer, then as a float; anything else is returned unchanged.
///
/// Strings that parse to NaN or infinity stay strings.
pub fn coerce_numeric(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    let trimmed = text.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(int) = trimmed.parse::<u64>() {
        return Value::from(int);
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => float_value(float),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_then_floats() {
        assert_eq!(coerce_numeric(json!("12")), json!(12));
        assert_eq!(coerce_numeric(json!(" -3 ")), json!(-3));
        assert_eq!(coerce_numeric(json!("1.5")), json!(1.5));
        assert_eq!(coerce_numeric(json!("1e3")), json!(1000.0));
    }

    #[test]
    fn non_numeric_strings_unchanged() {
        assert_eq!(coerce_numeric(json!("12 kg")), json!("12 kg"));
        assert_eq!(coerce_numeric(json!("nan")), json!("nan"));
        assert_eq!(coerce_numeric(json!("inf")), json!("inf"));
        assert_eq!(coerce_numeric(json!("")), json!(""));
    }

    #[test]
    fn non_strings_unchanged() {
        assert_eq!(coerce_numeric(json!(true)), json!(true));
        assert_eq!(coerce_numeric(json!(["1"])), json!(["1"]));
    }
}
