//! Templated replication of `oneToMany` rule blocks.
//!
//! A block with a `for` clause is replicated once per assignment in the
//! cross product of its loop variables, with `{name}` placeholders replaced
//! in every string value and every object key.

use adtl_model::value::to_text;
use adtl_model::{Result, SpecificationError};
use serde_json::{Map, Value};

const FOR: &str = "for";

/// Loop variable name to its value in one replication.
pub type Assignment = Vec<(String, Value)>;

/// Expand every block, keeping declaration order.
pub fn expand_for(blocks: &[Value]) -> Result<Vec<Value>> {
    let mut expanded = Vec::with_capacity(blocks.len());
    for block in blocks {
        expanded.extend(expand_block(block)?);
    }
    Ok(expanded)
}

/// Expand one block; blocks without `for` are returned unchanged.
pub fn expand_block(block: &Value) -> Result<Vec<Value>> {
    let Value::Object(map) = block else {
        return Ok(vec![block.clone()]);
    };
    let Some(for_expr) = map.get(FOR) else {
        return Ok(vec![block.clone()]);
    };
    let Value::Object(variables) = for_expr else {
        return Err(SpecificationError::MalformedFor {
            value: for_expr.clone(),
        });
    };

    // The first variable by name varies slowest.
    let mut ordered: Vec<(&String, &Value)> = variables.iter().collect();
    ordered.sort_by(|(left, _), (right, _)| left.cmp(right));
    let mut domains = Vec::with_capacity(ordered.len());
    for (name, spec) in ordered {
        domains.push((name.clone(), loop_values(name, spec)?));
    }

    let mut template = map.clone();
    template.remove(FOR);
    let template = Value::Object(template);
    Ok(cross_product(&domains)
        .iter()
        .map(|assignment| substitute(&template, assignment))
        .collect())
}

fn loop_values(name: &str, spec: &Value) -> Result<Vec<Value>> {
    let invalid = || SpecificationError::InvalidForVariable {
        variable: name.to_string(),
        value: spec.clone(),
    };
    match spec {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(range) => {
            let Some(Value::Array(bounds)) = range.get("range") else {
                return Err(invalid());
            };
            let [start, end] = bounds.as_slice() else {
                return Err(invalid());
            };
            match (start.as_i64(), end.as_i64()) {
                (Some(start), Some(end)) if end > start => {
                    Ok((start..=end).map(Value::from).collect())
                }
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

fn cross_product(domains: &[(String, Vec<Value>)]) -> Vec<Assignment> {
    let mut assignments: Vec<Assignment> = vec![Vec::new()];
    for (name, values) in domains {
        let mut next = Vec::with_capacity(assignments.len() * values.len());
        for assignment in &assignments {
            for value in values {
                let mut extended = assignment.clone();
                extended.push((name.clone(), value.clone()));
                next.push(extended);
            }
        }
        assignments = next;
    }
    assignments
}

/// Replace `{name}` placeholders in string leaves and object keys.
pub fn substitute(value: &Value, assignment: &Assignment) -> Value {
    match value {
        Value::String(s) => Value::String(replace_placeholders(s, assignment)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, assignment))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    (
                        replace_placeholders(key, assignment),
                        substitute(item, assignment),
                    )
                })
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

fn replace_placeholders(text: &str, assignment: &Assignment) -> String {
    let mut out = text.to_string();
    for (name, value) in assignment {
        out = out.replace(&format!("{{{name}}}"), &to_text(value));
    }
    out
}
