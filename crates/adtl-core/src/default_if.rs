//! Gating conditions for `oneToMany` entries written without an `if`.
//!
//! The table schema's `oneOf` alternatives each name a governing field (the
//! first required field that is not the discriminator). The entry attribute
//! named by one of those fields decides whether the entry carries data: the
//! synthesized condition holds when any of its source fields is non-empty,
//! or equals one of its mapped values when a `values` mapping is present.

use adtl_model::{
    CombinedField, CompareOp, Condition, Entry, FieldRule, Rule, SpecificationError,
};
use adtl_spec::schema::one_of_required;
use serde_json::Value;

/// Synthesize the condition for the entry at `index` of `table`.
pub fn default_condition(
    table: &str,
    index: usize,
    entry: &Entry,
    schema: Option<&Value>,
    discriminator: Option<&str>,
) -> Result<Condition, SpecificationError> {
    let fail = |message: String| SpecificationError::DefaultIf {
        table: table.to_string(),
        index,
        message,
    };
    let Some(schema) = schema else {
        return Err(fail("no 'if' given and the table has no schema".to_string()));
    };
    let options: Vec<String> = one_of_required(schema)
        .into_iter()
        .filter_map(|required| {
            required
                .into_iter()
                .find(|field| Some(field.as_str()) != discriminator)
        })
        .collect();
    let Some((option, rule)) = options
        .iter()
        .find_map(|option| entry.attributes.get(option).map(|rule| (option, rule)))
    else {
        return Err(fail(format!(
            "none of the schema alternatives' fields {options:?} is mapped"
        )));
    };

    match rule {
        Rule::Field(field) if field.values.is_none() => Ok(non_empty(field)),
        Rule::Field(field) => Ok(Condition::any(field_gates(field))),
        Rule::Combined(combined) => {
            let mut gates = Vec::new();
            for sub_rule in &combined.fields {
                let CombinedField::Rule(Rule::Field(field)) = sub_rule else {
                    return Err(fail(format!(
                        "attribute {option} combines rules that do not name a field"
                    )));
                };
                gates.extend(field_gates(field));
            }
            Ok(Condition::any(gates))
        }
        Rule::Constant(_) => Err(fail(format!("attribute {option} is a constant"))),
    }
}

fn non_empty(rule: &FieldRule) -> Condition {
    Condition::compare(&rule.field, CompareOp::Ne, "").skippable(rule.can_skip)
}

/// One equality test per mapped value, or a single non-empty test.
fn field_gates(rule: &FieldRule) -> Vec<Condition> {
    match &rule.values {
        Some(values) => values
            .keys()
            .map(|key| Condition::equals(&rule.field, key.as_str()).skippable(rule.can_skip))
            .collect(),
        None => vec![non_empty(rule)],
    }
}
