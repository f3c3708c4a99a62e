//! JSON-Schema validation of output rows.
//!
//! Schemas are compiled once per table with `jsonschema`, with `format`
//! assertions switched on. Tables with a discriminator get one compiled
//! schema per discriminator value, taken from the `oneOf` alternatives.

use std::collections::BTreeMap;

use adtl_core::RowValidator;
use adtl_model::Row;
use adtl_model::value::to_text;
use adtl_spec::expand_schema;
use anyhow::{Result, anyhow};
use jsonschema::{ValidationError, Validator};
use serde_json::Value;

/// Validates rows of one table against its schema.
#[derive(Debug)]
pub struct SchemaValidator {
    schema: Validator,
    /// Compiled schemas per discriminator value, when the schema pins them.
    by_discriminator: Option<(String, BTreeMap<String, Validator>)>,
}

impl SchemaValidator {
    /// # Errors
    ///
    /// Returns an error if the schema does not compile.
    pub fn new(schema: &Value) -> Result<Self> {
        Ok(Self {
            schema: compile(schema)?,
            by_discriminator: None,
        })
    }

    /// Validate `oneToMany` rows against the alternative their discriminator selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema or one of its alternatives does not compile.
    pub fn for_table(schema: &Value, discriminator: Option<&str>) -> Result<Self> {
        let mut validator = Self::new(schema)?;
        if let Some(field) = discriminator
            && let Some(expanded) = expand_schema(schema, field)
        {
            let compiled = expanded
                .iter()
                .map(|(key, alternative)| Ok((key.clone(), compile(alternative)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            validator.by_discriminator = Some((field.to_string(), compiled));
        }
        Ok(validator)
    }

    fn validator_for(&self, row: &Row) -> &Validator {
        let Some((field, expanded)) = &self.by_discriminator else {
            return &self.schema;
        };
        row.get(field)
            .map(to_text)
            .and_then(|key| expanded.get(&key))
            .unwrap_or(&self.schema)
    }
}

impl RowValidator for SchemaValidator {
    fn validate(&self, row: &Row) -> Result<(), String> {
        let instance = Value::Object(row.clone());
        self.validator_for(row)
            .validate(&instance)
            .map_err(|error| describe(&error))
    }
}

fn compile(schema: &Value) -> Result<Validator> {
    jsonschema::options()
        .should_validate_formats(true)
        .build(schema)
        .map_err(|error| anyhow!("invalid schema: {error}"))
}

/// `field.path: message`, or the bare message for the row itself.
fn describe(error: &ValidationError<'_>) -> String {
    let path: Vec<String> = error
        .instance_path
        .into_iter()
        .map(|segment| segment.to_string())
        .collect();
    if path.is_empty() {
        error.to_string()
    } else {
        format!("{}: {error}", path.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        let Value::Object(map) = value else {
            unreachable!("fixture is an object");
        };
        map
    }

    fn validator(schema: Value) -> SchemaValidator {
        SchemaValidator::new(&schema).expect("schema compiles")
    }

    #[test]
    fn required_and_types() {
        let validator = validator(json!({
            "required": ["id", "age"],
            "properties": {"id": {"type": "integer"}, "age": {"type": ["number", "null"]}}
        }));
        assert_eq!(validator.validate(&row(json!({"id": 1, "age": 30.5}))), Ok(()));
        assert_eq!(
            validator.validate(&row(json!({"id": 1}))),
            Err(r#""age" is a required property"#.to_string())
        );
        let err = validator
            .validate(&row(json!({"id": "x", "age": 1})))
            .expect_err("string id");
        assert!(err.starts_with("id: "), "{err}");
    }

    #[test]
    fn bounds_patterns_and_formats() {
        let validator = validator(json!({
            "properties": {
                "age": {"type": "integer", "minimum": 0},
                "date": {"type": "string", "format": "date"},
                "code": {"type": "string", "pattern": "^[A-Z]+$"}
            }
        }));
        assert_eq!(
            validator.validate(&row(json!({"age": 4, "date": "2022-02-05", "code": "AB"}))),
            Ok(())
        );
        for (field, bad) in [
            ("age", json!(-5)),
            ("date", json!("not-a-date")),
            ("code", json!("lower")),
        ] {
            let err = validator
                .validate(&row(json!({ field: bad })))
                .expect_err("violation");
            assert!(err.starts_with(&format!("{field}: ")), "{err}");
        }
    }

    #[test]
    fn refs_and_combinators() {
        let validator = validator(json!({
            "$defs": {"positive": {"type": "number", "exclusiveMinimum": 0}},
            "properties": {
                "weight": {"$ref": "#/$defs/positive"},
                "status": {"const": "done"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "anyOf": [{"required": ["weight"]}, {"required": ["status"]}]
        }));
        assert_eq!(validator.validate(&row(json!({"weight": 2.5, "tags": ["a"]}))), Ok(()));
        assert!(validator.validate(&row(json!({"weight": 0}))).is_err());
        assert!(validator.validate(&row(json!({"status": "open"}))).is_err());
        assert!(validator.validate(&row(json!({"status": "done", "tags": [1]}))).is_err());
        assert!(validator.validate(&row(json!({"tags": []}))).is_err());
    }

    #[test]
    fn one_of_needs_exactly_one_match() {
        let validator = validator(json!({
            "oneOf": [{"required": ["is_present"]}, {"required": ["value"]}]
        }));
        assert_eq!(validator.validate(&row(json!({"value": 1}))), Ok(()));
        assert!(
            validator
                .validate(&row(json!({"value": 1, "is_present": true})))
                .is_err()
        );
    }

    #[test]
    fn invalid_schema_is_an_error() {
        let err = SchemaValidator::new(&json!({"type": "integr"})).expect_err("bad type");
        assert!(err.to_string().starts_with("invalid schema"));
    }

    #[test]
    fn discriminator_selects_the_alternative() {
        let schema = json!({
            "properties": {"name": {}, "date": {}},
            "oneOf": [
                {"properties": {"name": {"const": "headache"}, "is_present": {"type": "boolean"}}, "required": ["is_present"]},
                {"properties": {"name": {"const": "temperature"}, "value": {"type": "number"}}, "required": ["value"]}
            ]
        });
        let validator = SchemaValidator::for_table(&schema, Some("name")).expect("compiles");
        assert_eq!(
            validator.validate(&row(json!({"name": "temperature", "value": 37.5}))),
            Ok(())
        );
        assert_eq!(
            validator.validate(&row(json!({"name": "headache"}))),
            Err(r#""is_present" is a required property"#.to_string())
        );
    }
}
