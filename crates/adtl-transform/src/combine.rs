//! `combinedType` rules and the reducers shared with groupBy merging.

use std::cmp::Ordering;

use adtl_model::value::{compare_values, dedupe, flatten, is_blank, is_truthy, values_equal};
use adtl_model::{
    CombinedField, CombinedKind, CombinedRule, EvalContext, EvalResult, ExcludeWhen, FieldRule,
    Row, RowEvaluationError, Rule,
};
use serde_json::Value;

use crate::eval::evaluate;

/// Evaluate a `combinedType` rule.
pub fn evaluate_combined(row: &Row, rule: &CombinedRule, ctx: &EvalContext) -> EvalResult<Value> {
    let rules = expand_fields(row, &rule.fields);
    match rule.kind {
        CombinedKind::FirstNonNull => {
            for sub_rule in &rules {
                let value = evaluate(row, sub_rule, ctx)?;
                if let Some(found) = flatten(vec![value]).into_iter().find(|v| !v.is_null()) {
                    return Ok(found);
                }
            }
            Ok(Value::Null)
        }
        CombinedKind::List | CombinedKind::Set => {
            let values = rules
                .iter()
                .map(|sub_rule| evaluate(row, sub_rule, ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            let mut values = flatten(values);
            if rule.kind == CombinedKind::Set {
                values = dedupe(values);
            }
            Ok(Value::Array(exclude(values, &rule.exclude_when)))
        }
        reducer => {
            let values = rules
                .iter()
                .map(|sub_rule| evaluate(row, sub_rule, ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            reduce(reducer, values)
        }
    }
}

/// Expand `fieldPattern` entries into one field rule per matching row key.
fn expand_fields(row: &Row, fields: &[CombinedField]) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(fields.len());
    for field in fields {
        match field {
            CombinedField::Rule(rule) => rules.push(rule.clone()),
            CombinedField::Pattern { pattern, template } => {
                rules.extend(row.keys().filter(|key| pattern.matches(key)).map(|key| {
                    Rule::Field(Box::new(FieldRule {
                        field: key.clone(),
                        ..template.clone()
                    }))
                }));
            }
        }
    }
    rules
}

fn exclude(values: Vec<Value>, policy: &ExcludeWhen) -> Vec<Value> {
    match policy {
        ExcludeWhen::Keep => values,
        ExcludeWhen::Null => values.into_iter().filter(|v| !v.is_null()).collect(),
        ExcludeWhen::FalseLike => values.into_iter().filter(is_truthy).collect(),
        ExcludeWhen::Listed(excluded) => values
            .into_iter()
            .filter(|v| !excluded.iter().any(|e| values_equal(v, e)))
            .collect(),
    }
}

/// Apply an `all`/`any`/`min`/`max` reducer, ignoring null and empty values.
///
/// Returns null when nothing remains.
pub fn reduce(kind: CombinedKind, values: Vec<Value>) -> EvalResult<Value> {
    let values: Vec<Value> = values.into_iter().filter(|v| !is_blank(v)).collect();
    if values.is_empty() {
        return Ok(Value::Null);
    }
    match kind {
        CombinedKind::All => Ok(Value::Bool(values.iter().all(is_truthy))),
        CombinedKind::Any => Ok(Value::Bool(values.iter().any(is_truthy))),
        CombinedKind::Min => extreme(values, Ordering::Less),
        CombinedKind::Max => extreme(values, Ordering::Greater),
        other => Err(RowEvaluationError::MalformedRule {
            message: format!("{other} is not a reducer"),
        }),
    }
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> EvalResult<Value> {
    let mut iter = values.into_iter();
    let Some(mut best) = iter.next() else {
        return Ok(Value::Null);
    };
    for value in iter {
        let ordering = compare_values(&value, &best).ok_or_else(|| {
            RowEvaluationError::IncomparableValues {
                left: value.clone(),
                right: best.clone(),
            }
        })?;
        if ordering == wanted {
            best = value;
        }
    }
    Ok(best)
}

/// Merge a newly evaluated combined value into the value already held for a group.
///
/// Reducers fold `[existing, new]`, `list` concatenates, `set` unions and
/// `firstNonNull` keeps the existing value.
pub fn merge_combined(kind: CombinedKind, existing: Value, new: Value) -> EvalResult<Value> {
    match kind {
        CombinedKind::FirstNonNull => Ok(if existing.is_null() { new } else { existing }),
        CombinedKind::List => Ok(Value::Array(flatten(vec![existing, new]))),
        CombinedKind::Set => Ok(Value::Array(dedupe(flatten(vec![existing, new])))),
        reducer => reduce(reducer, vec![existing, new]),
    }
}
