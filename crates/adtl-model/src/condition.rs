//! Typed `if` conditions.
//!
//! A condition node in a specification document is an object with exactly
//! one key, optionally accompanied by `can_skip`:
//!
//! ```json
//! {"all": [{"age": {">": 18}}, {"sex": "F", "can_skip": true}]}
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Result, SpecificationError};
use crate::pattern::Pattern;

const CAN_SKIP: &str = "can_skip";

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub predicate: Predicate,
    /// Treat a missing field as false instead of failing. Inherited by nested nodes.
    pub can_skip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Not(Box<Condition>),
    Any(Vec<Condition>),
    All(Vec<Condition>),
    Compare {
        field: String,
        op: CompareOp,
        target: Value,
    },
    /// `=~`: case-insensitive regular expression anchored at the start.
    Matches { field: String, pattern: Pattern },
    Equals { field: String, target: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Condition {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            can_skip: false,
        }
    }

    /// Shorthand for an equality test on a field.
    pub fn equals(field: impl Into<String>, target: impl Into<Value>) -> Self {
        Self::new(Predicate::Equals {
            field: field.into(),
            target: target.into(),
        })
    }

    /// Shorthand for a comparison on a field.
    pub fn compare(field: impl Into<String>, op: CompareOp, target: impl Into<Value>) -> Self {
        Self::new(Predicate::Compare {
            field: field.into(),
            op,
            target: target.into(),
        })
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::new(Predicate::Any(conditions))
    }

    #[must_use]
    pub fn skippable(mut self, can_skip: bool) -> Self {
        self.can_skip = can_skip;
        self
    }

    /// Parse a condition node from a specification document.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(SpecificationError::malformed_condition(format!(
                "condition must be an object, got {value}"
            )));
        };
        let (key, body) = condition_key(map)?;
        let can_skip = map.len() == 2;
        let predicate = match key.as_str() {
            "not" => Predicate::Not(Box::new(Self::from_value(body)?)),
            "any" => Predicate::Any(parse_list(key, body)?),
            "all" => Predicate::All(parse_list(key, body)?),
            field => parse_field_test(field, body)?,
        };
        Ok(Self {
            predicate,
            can_skip,
        })
    }

    /// Every row field this condition reads.
    pub fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match &self.predicate {
            Predicate::Not(inner) => inner.collect_fields(out),
            Predicate::Any(items) | Predicate::All(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Predicate::Compare { field, .. }
            | Predicate::Matches { field, .. }
            | Predicate::Equals { field, .. } => {
                out.insert(field.clone());
            }
        }
    }
}

fn condition_key(map: &Map<String, Value>) -> Result<(&String, &Value)> {
    match map.len() {
        1 => map
            .iter()
            .next()
            .ok_or_else(|| SpecificationError::malformed_condition("empty condition")),
        2 if map.contains_key(CAN_SKIP) => map
            .iter()
            .find(|(key, _)| key.as_str() != CAN_SKIP)
            .ok_or_else(|| SpecificationError::malformed_condition("condition has no test")),
        _ => Err(SpecificationError::malformed_condition(format!(
            "condition must have one key, or two keys where the second is can_skip: {}",
            Value::Object(map.clone())
        ))),
    }
}

fn parse_list(key: &str, body: &Value) -> Result<Vec<Condition>> {
    let Value::Array(items) = body else {
        return Err(SpecificationError::malformed_condition(format!(
            "'{key}' expects a list of conditions"
        )));
    };
    items.iter().map(Condition::from_value).collect()
}

fn parse_field_test(field: &str, body: &Value) -> Result<Predicate> {
    match body {
        Value::Object(test) => {
            let mut entries = test.iter();
            let (Some((op, target)), None) = (entries.next(), entries.next()) else {
                return Err(SpecificationError::malformed_condition(format!(
                    "comparison on {field} must name exactly one operator"
                )));
            };
            if !is_scalar(target) {
                return Err(SpecificationError::malformed_condition(format!(
                    "comparison target for {field} must be a scalar"
                )));
            }
            if op == "=~" {
                let Value::String(source) = target else {
                    return Err(SpecificationError::malformed_condition(format!(
                        "regular expression for {field} must be a string"
                    )));
                };
                return Ok(Predicate::Matches {
                    field: field.to_string(),
                    pattern: Pattern::anchored_case_insensitive(source)?,
                });
            }
            let op = CompareOp::parse(op)
                .ok_or_else(|| SpecificationError::UnknownOperator { op: op.clone() })?;
            Ok(Predicate::Compare {
                field: field.to_string(),
                op,
                target: target.clone(),
            })
        }
        Value::Array(_) => Err(SpecificationError::malformed_condition(
            "if-subexpressions should be a dictionary",
        )),
        scalar => Ok(Predicate::Equals {
            field: field.to_string(),
            target: scalar.clone(),
        }),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
