//! Evaluation of `if` conditions against a row.

use std::cmp::Ordering;

use adtl_model::value::{compare_values, is_blank, to_text, values_equal};
use adtl_model::{CompareOp, Condition, EvalContext, EvalResult, Predicate, Row, RowEvaluationError};
use serde_json::{Number, Value};

/// Whether `condition` holds for `row`.
///
/// A field missing from the row is an error unless the node (or any
/// enclosing node) is `can_skip`, or the field matches the context's skip
/// pattern; in both cases the test is simply false.
pub fn holds(row: &Row, condition: &Condition, ctx: &EvalContext) -> EvalResult<bool> {
    holds_inner(row, condition, ctx, false)
}

fn holds_inner(
    row: &Row,
    condition: &Condition,
    ctx: &EvalContext,
    inherited_skip: bool,
) -> EvalResult<bool> {
    let can_skip = inherited_skip || condition.can_skip;
    match &condition.predicate {
        Predicate::Not(inner) => Ok(!holds_inner(row, inner, ctx, can_skip)?),
        Predicate::Any(items) => {
            for item in items {
                if holds_inner(row, item, ctx, can_skip)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::All(items) => {
            for item in items {
                if !holds_inner(row, item, ctx, can_skip)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Equals { field, target } => {
            let Some(raw) = lookup(row, field, ctx, can_skip)? else {
                return Ok(false);
            };
            Ok(cast_to(raw, target).is_some_and(|cast| values_equal(&cast, target)))
        }
        Predicate::Compare { field, op, target } => {
            let Some(raw) = lookup(row, field, ctx, can_skip)? else {
                return Ok(false);
            };
            let Some(cast) = cast_to(raw, target) else {
                tracing::debug!(
                    field = %field,
                    value = %raw,
                    target = %target,
                    "cast failed, condition is false"
                );
                return Ok(false);
            };
            compare(&cast, *op, target)
        }
        Predicate::Matches { field, pattern } => {
            let Some(raw) = lookup(row, field, ctx, can_skip)? else {
                return Ok(false);
            };
            Ok(pattern.matches(&to_text(raw)))
        }
    }
}

fn lookup<'r>(
    row: &'r Row,
    field: &str,
    ctx: &EvalContext,
    can_skip: bool,
) -> EvalResult<Option<&'r Value>> {
    match row.get(field) {
        Some(value) => Ok(Some(value)),
        None if can_skip || ctx.skips(field) => Ok(None),
        None => Err(RowEvaluationError::MissingField {
            field: field.to_string(),
        }),
    }
}

fn compare(cast: &Value, op: CompareOp, target: &Value) -> EvalResult<bool> {
    match op {
        CompareOp::Eq => Ok(values_equal(cast, target)),
        CompareOp::Ne => Ok(!values_equal(cast, target)),
        ordering_op => {
            let Some(ordering) = compare_values(cast, target) else {
                return Err(RowEvaluationError::IncomparableValues {
                    left: cast.clone(),
                    right: target.clone(),
                });
            };
            Ok(match ordering_op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Cast a row value to the kind of `target`.
///
/// | target  | accepted source values                                      |
/// |---------|-------------------------------------------------------------|
/// | integer | integers, integral floats, integer strings (trimmed)        |
/// | float   | numbers, float strings (trimmed)                            |
/// | string  | anything, via its text form                                 |
/// | boolean | booleans, numbers (non-zero), `true/false/yes/no/1/0` text  |
/// | null    | anything; blank values become null                          |
///
/// `None` is a cast failure.
pub fn cast_to(raw: &Value, target: &Value) -> Option<Value> {
    match target {
        Value::Number(n) if n.is_f64() => cast_float(raw),
        Value::Number(_) => cast_integer(raw),
        Value::String(_) => Some(Value::String(to_text(raw))),
        Value::Bool(_) => cast_bool(raw).map(Value::Bool),
        Value::Null => Some(if is_blank(raw) { Value::Null } else { raw.clone() }),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn cast_integer(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) if n.is_f64() => {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then(|| Value::from(f as i64))
        }
        Value::Number(_) => Some(raw.clone()),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        _ => None,
    }
}

fn cast_float(raw: &Value) -> Option<Value> {
    let f = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    Number::from_f64(f).map(Value::Number)
}

fn cast_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
