//! Reference/definition expansion.
//!
//! Any object carrying a `ref` key is replaced by the named definition with
//! the object's own keys laid over it. Definitions may themselves refer to
//! other definitions; a definition reached again while it is being expanded
//! is reported as a cycle.

use adtl_model::{Result, SpecificationError};
use serde_json::{Map, Value};

const REF: &str = "ref";

/// Expand every `ref` in `fragment` using `defs`.
pub fn expand_refs(fragment: &Value, defs: &Map<String, Value>) -> Result<Value> {
    let mut active = Vec::new();
    expand(fragment, defs, &mut active)
}

fn expand(fragment: &Value, defs: &Map<String, Value>, active: &mut Vec<String>) -> Result<Value> {
    match fragment {
        Value::Object(map) if map.is_empty() => Ok(fragment.clone()),
        Value::Object(map) => match map.get(REF) {
            Some(reference) => expand_reference(reference, map, defs, active),
            None => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), expand(value, defs, active)?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| expand(item, defs, active))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn expand_reference(
    reference: &Value,
    own: &Map<String, Value>,
    defs: &Map<String, Value>,
    active: &mut Vec<String>,
) -> Result<Value> {
    let Value::String(name) = reference else {
        return Err(SpecificationError::malformed_rule(format!(
            "'ref' must name a definition, got {reference}"
        )));
    };
    if active.contains(name) {
        let mut chain = active.clone();
        chain.push(name.clone());
        return Err(SpecificationError::RefCycle {
            chain: chain.join(" -> "),
        });
    }
    let definition = defs
        .get(name)
        .ok_or_else(|| SpecificationError::UnknownRef { name: name.clone() })?;
    if !definition.is_object() {
        return Err(SpecificationError::malformed_rule(format!(
            "definition {name} must be a mapping"
        )));
    }

    active.push(name.clone());
    let expanded = expand(definition, defs, active);
    active.pop();
    let Value::Object(mut merged) = expanded? else {
        return Err(SpecificationError::malformed_rule(format!(
            "definition {name} must expand to a mapping"
        )));
    };

    for (key, value) in own {
        if key != REF {
            merged.insert(key.clone(), expand(value, defs, active)?);
        }
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs() -> Map<String, Value> {
        let Value::Object(defs) = json!({
            "sexMapping": {"field": "sex", "values": {"1": "male", "2": "female"}},
            "yesNo": {"values": {"1": true, "2": false}},
            "consent": {"ref": "yesNo", "field": "consent"}
        }) else {
            unreachable!()
        };
        defs
    }

    #[test]
    fn own_keys_override_definition() {
        let expanded = expand_refs(
            &json!({"sex": {"ref": "sexMapping", "field": "sex_at_birth"}}),
            &defs(),
        )
        .expect("expand");
        assert_eq!(
            expanded,
            json!({"sex": {"field": "sex_at_birth", "values": {"1": "male", "2": "female"}}})
        );
    }

    #[test]
    fn nested_definitions_expand() {
        let expanded = expand_refs(&json!([{"ref": "consent"}]), &defs()).expect("expand");
        assert_eq!(
            expanded,
            json!([{"field": "consent", "values": {"1": true, "2": false}}])
        );
    }

    #[test]
    fn empty_objects_pass_through() {
        assert_eq!(expand_refs(&json!({}), &defs()).expect("expand"), json!({}));
    }

    #[test]
    fn unknown_reference_fails() {
        let err = expand_refs(&json!({"ref": "nope"}), &defs()).expect_err("unknown");
        assert!(matches!(err, SpecificationError::UnknownRef { name } if name == "nope"));
    }

    #[test]
    fn cycles_are_detected() {
        let Value::Object(defs) = json!({
            "a": {"ref": "b", "field": "x"},
            "b": {"ref": "a"}
        }) else {
            unreachable!()
        };
        let err = expand_refs(&json!({"ref": "a"}), &defs).expect_err("cycle");
        assert_eq!(
            err.to_string(),
            "reference cycle detected: a -> b -> a"
        );
    }
}
