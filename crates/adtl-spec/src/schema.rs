//! Structural helpers over a table's JSON Schema.
//!
//! Only `required`, `properties`, `oneOf`/`anyOf`, `const` and `enum` are
//! inspected. Validation itself belongs to an external validator.

use std::collections::{BTreeMap, BTreeSet};

use adtl_model::value::to_text;
use serde_json::{Map, Value, json};

const ALTERNATIVES: [&str; 2] = ["oneOf", "anyOf"];

/// Fields that hold dates: named `date`, containing `date_` or `_date`, or with `format: date`.
pub fn date_fields(schema: &Value) -> BTreeSet<String> {
    let Some(Value::Object(properties)) = schema.get("properties") else {
        return BTreeSet::new();
    };
    properties
        .iter()
        .filter(|(name, property)| {
            name.as_str() == "date"
                || name.contains("date_")
                || name.contains("_date")
                || property.get("format").and_then(Value::as_str) == Some("date")
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Drop `optional` fields from the schema's `required` lists.
///
/// Applies to the top level and to each `oneOf`/`anyOf` alternative. When
/// every alternative is left without constraints the combinator is removed;
/// otherwise duplicate alternatives are collapsed.
pub fn make_fields_optional(schema: &Value, optional: &[String]) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };
    if optional.is_empty() {
        return schema.clone();
    }
    let optional: BTreeSet<&str> = optional.iter().map(String::as_str).collect();
    let mut relaxed = map.clone();

    if let Some(required) = relaxed.get_mut("required") {
        *required = relax_required(required, &optional);
    }

    for key in ALTERNATIVES {
        let Some(Value::Array(alternatives)) = relaxed.get(key) else {
            continue;
        };
        if !alternatives.iter().any(|alt| alt.get("required").is_some()) {
            continue;
        }
        let alternatives: Vec<Value> = alternatives
            .iter()
            .map(|alternative| match alternative {
                Value::Object(alt) => {
                    let mut alt = alt.clone();
                    if let Some(required) = alt.get_mut("required") {
                        *required = relax_required(required, &optional);
                    }
                    Value::Object(alt)
                }
                other => other.clone(),
            })
            .collect();

        if alternatives.iter().all(is_vacuous) {
            relaxed.remove(key);
        } else {
            let mut unique: Vec<Value> = Vec::with_capacity(alternatives.len());
            for alternative in alternatives {
                if !unique.contains(&alternative) {
                    unique.push(alternative);
                }
            }
            relaxed.insert(key.to_string(), Value::Array(unique));
        }
    }
    Value::Object(relaxed)
}

fn relax_required(required: &Value, optional: &BTreeSet<&str>) -> Value {
    let Value::Array(fields) = required else {
        return required.clone();
    };
    // Order is kept: default-if reads the first required field.
    let remaining: Vec<Value> = fields
        .iter()
        .filter(|field| field.as_str().is_none_or(|name| !optional.contains(name)))
        .cloned()
        .collect();
    Value::Array(remaining)
}

fn is_vacuous(alternative: &Value) -> bool {
    match alternative {
        Value::Object(map) => map.values().all(|value| match value {
            Value::Array(items) => items.is_empty(),
            Value::Object(inner) => inner.is_empty(),
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::String(s) => s.is_empty(),
            Value::Number(_) => false,
        }),
        _ => false,
    }
}

/// Required fields of each `oneOf` alternative, in declaration order.
pub fn one_of_required(schema: &Value) -> Vec<Vec<String>> {
    let Some(Value::Array(alternatives)) = schema.get("oneOf") else {
        return Vec::new();
    };
    alternatives
        .iter()
        .map(|alternative| {
            alternative
                .get("required")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Property names declared at the top level of a schema.
pub fn property_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| properties.keys().cloned().collect())
        .unwrap_or_default()
}

/// Split a `oneOf` schema into one concrete schema per discriminator value.
///
/// Each alternative must pin the discriminator with `const` or `enum`;
/// alternatives that do not are skipped. Returns `None` when no alternative
/// pins it, meaning the schema is used as is.
pub fn expand_schema(schema: &Value, discriminator: &str) -> Option<BTreeMap<String, Value>> {
    let general_properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let general_required = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let additional = schema
        .get("additionalProperties")
        .cloned()
        .unwrap_or(Value::Bool(false));

    let mut expanded = BTreeMap::new();
    for alternative in schema.get("oneOf").and_then(Value::as_array)? {
        let properties = alternative
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let Some(selector) = properties.get(discriminator) else {
            continue;
        };
        let keys: Vec<Value> = if let Some(constant) = selector.get("const") {
            vec![constant.clone()]
        } else if let Some(Value::Array(values)) = selector.get("enum") {
            values.clone()
        } else {
            continue;
        };

        let mut merged: Map<String, Value> = general_properties.clone();
        merged.extend(properties);
        let mut required = general_required.clone();
        if let Some(Value::Array(extra)) = alternative.get("required") {
            required.extend(extra.iter().cloned());
        }
        let concrete = json!({
            "type": "object",
            "properties": merged,
            "required": required,
            "additionalProperties": additional,
        });
        for key in keys {
            expanded.insert(to_text(&key), concrete.clone());
        }
    }
    (!expanded.is_empty()).then_some(expanded)
}
