//! Rule evaluation against a single row.

use adtl_model::value::{as_float, float_value, is_blank, lookup_key, to_text};
use adtl_model::{
    Apply, EvalContext, EvalResult, FieldRule, FieldType, Row, RowEvaluationError, Rule,
    UnitConversion, ValueMap,
};
use serde_json::Value;

use crate::combine::evaluate_combined;
use crate::condition::holds;
use crate::dates::reformat;
use crate::functions::{TransformError, builtin_registry};
use crate::hash::hash_sensitive;
use crate::numeric::coerce_numeric;
use crate::units::convert;

const TARGET_DATE_FORMAT: &str = "%Y-%m-%d";

/// Evaluate `rule` against `row`.
///
/// Sensitive field values are hashed once every other transform has run.
/// String results of field and combined rules are coerced to integers or
/// floats where they parse; constants are returned as written.
pub fn evaluate(row: &Row, rule: &Rule, ctx: &EvalContext) -> EvalResult<Value> {
    if let Rule::Constant(value) = rule {
        return Ok(value.clone());
    }
    let value = evaluate_raw(row, rule, ctx)?;
    if let Rule::Field(field) = rule
        && field.sensitive
        && !value.is_null()
    {
        return Ok(Value::String(hash_sensitive(&value)));
    }
    Ok(coerce_numeric(value))
}

/// Evaluate without hashing or numeric coercion.
pub fn evaluate_raw(row: &Row, rule: &Rule, ctx: &EvalContext) -> EvalResult<Value> {
    match rule {
        Rule::Constant(value) => Ok(value.clone()),
        Rule::Field(field) => evaluate_field(row, field, ctx),
        Rule::Combined(combined) => evaluate_combined(row, combined, ctx),
    }
}

fn evaluate_field(row: &Row, rule: &FieldRule, ctx: &EvalContext) -> EvalResult<Value> {
    if !row.contains_key(&rule.field) && (rule.can_skip || ctx.skips(&rule.field)) {
        return Ok(Value::Null);
    }
    if let Some(condition) = &rule.condition
        && !holds(row, condition, ctx)?
    {
        return Ok(Value::Null);
    }
    let mut value = row
        .get(&rule.field)
        .cloned()
        .ok_or_else(|| RowEvaluationError::MissingField {
            field: rule.field.clone(),
        })?;

    if let Some(apply) = &rule.apply {
        value = apply_transform(row, value, apply, ctx)?;
    }
    if is_blank(&value) {
        return Ok(Value::Null);
    }
    if let Some(values) = &rule.values {
        value = map_values(value, values, rule, ctx);
        if value.is_null() {
            return Ok(Value::Null);
        }
    }
    if let Some(unit) = &rule.unit {
        return convert_unit(row, value, unit, ctx);
    }
    if rule.source_date.is_some() || ctx.is_date {
        return convert_date(row, value, rule, ctx);
    }
    Ok(value)
}

fn apply_transform(row: &Row, value: Value, apply: &Apply, ctx: &EvalContext) -> EvalResult<Value> {
    let function = builtin_registry().get(&apply.function).ok_or_else(|| {
        RowEvaluationError::UnknownFunction {
            function: apply.function.clone(),
        }
    })?;
    let params = apply
        .params
        .iter()
        .map(|param| resolve_param(row, param))
        .collect::<EvalResult<Vec<_>>>()?;
    match function(&value, &params) {
        Ok(result) => Ok(result),
        Err(TransformError::Unmatched(message)) if ctx.return_unmatched => {
            tracing::warn!(function = %apply.function, "{message}");
            Ok(value)
        }
        Err(TransformError::Unmatched(message)) => {
            tracing::error!(function = %apply.function, "{message}");
            Ok(Value::Null)
        }
        Err(TransformError::Failed(message)) => Err(RowEvaluationError::TransformFailed {
            function: apply.function.clone(),
            message,
        }),
    }
}

/// Replace `$name` parameters with the row's `name` field, one list level deep.
fn resolve_param(row: &Row, param: &Value) -> EvalResult<Value> {
    match param {
        Value::String(s) if s.starts_with('$') => field_param(row, &s[1..]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) if s.starts_with('$') => field_param(row, &s[1..]),
                other => Ok(other.clone()),
            })
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn field_param(row: &Row, name: &str) -> EvalResult<Value> {
    row.get(name)
        .cloned()
        .ok_or_else(|| RowEvaluationError::MissingParameterField {
            field: name.to_string(),
        })
}

fn map_values(value: Value, values: &ValueMap, rule: &FieldRule, ctx: &EvalContext) -> Value {
    if rule.field_type == Some(FieldType::EnumList) {
        let Value::String(text) = &value else {
            return value;
        };
        let items = text
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|item| map_one(Value::String(item.trim().to_string()), values, rule, ctx))
            .collect();
        return Value::Array(items);
    }
    map_one(value, values, rule, ctx)
}

fn map_one(value: Value, values: &ValueMap, rule: &FieldRule, ctx: &EvalContext) -> Value {
    let value = match value {
        Value::String(text) if rule.case_insensitive => Value::String(text.trim().to_lowercase()),
        other => other,
    };
    let found = match &value {
        Value::String(needle) if rule.case_insensitive => values
            .iter()
            .find(|(key, _)| key.to_lowercase() == *needle)
            .map(|(_, mapped)| mapped.clone()),
        other => lookup_key(other).and_then(|key| values.get(&key).cloned()),
    };
    let mapped = match found {
        Some(mapped) => mapped,
        None if rule.ignore_missing_key || ctx.return_unmatched => value,
        None => Value::Null,
    };
    if is_blank(&mapped) { Value::Null } else { mapped }
}

fn convert_unit(
    row: &Row,
    value: Value,
    unit: &UnitConversion,
    ctx: &EvalContext,
) -> EvalResult<Value> {
    let source_ctx = ctx.clone().with_date(false);
    let source = evaluate(row, &unit.source, &source_ctx)?;
    let number = as_float(&value);
    let source = match source {
        Value::String(source) => source,
        other => {
            tracing::debug!(
                source_unit = %other,
                unit = %unit.target,
                "source unit is not a string, assuming the value is already in the target unit"
            );
            return match number {
                Some(number) => Ok(float_value(number)),
                None => unconvertible(value, "not a number".to_string(), ctx),
            };
        }
    };
    let Some(number) = number else {
        return unconvertible(value, "not a number".to_string(), ctx);
    };
    match convert(number, &source, &unit.target) {
        Ok(converted) => Ok(float_value(converted)),
        Err(err) => unconvertible(value, err.to_string(), ctx),
    }
}

fn unconvertible(value: Value, message: String, ctx: &EvalContext) -> EvalResult<Value> {
    if ctx.return_unmatched {
        tracing::debug!(value = %value, "{message}, passing value through");
        return Ok(value);
    }
    Err(RowEvaluationError::UnitConversion {
        value: to_text(&value),
        message,
    })
}

fn convert_date(row: &Row, value: Value, rule: &FieldRule, ctx: &EvalContext) -> EvalResult<Value> {
    let target = rule.date.as_deref().unwrap_or(TARGET_DATE_FORMAT);
    let source = match &rule.source_date {
        Some(source_rule) => to_text(&evaluate(row, source_rule, &ctx.clone().with_date(false))?),
        None => ctx.default_date_format.clone(),
    };
    if source == target {
        return Ok(value);
    }
    let reformatted = match &value {
        Value::String(text) => reformat(text, &source, target),
        _ => None,
    };
    match reformatted {
        Some(text) => Ok(Value::String(text)),
        None => {
            tracing::info!(value = %value, format = %source, "could not parse date");
            Ok(if ctx.return_unmatched { value } else { Value::Null })
        }
    }
}
