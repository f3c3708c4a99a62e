//! Typed attribute rules.
//!
//! A rule is either a literal, a reference to a source field with optional
//! post-processing, or a `combinedType` over sub-rules. Rules are parsed
//! from the resolved specification tree once, at load time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::{Result, SpecificationError};
use crate::pattern::Pattern;
use crate::value::is_truthy;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Constant(Value),
    Field(Box<FieldRule>),
    Combined(CombinedRule),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldRule {
    pub field: String,
    pub condition: Option<Condition>,
    pub values: Option<ValueMap>,
    pub unit: Option<UnitConversion>,
    /// Rule producing the source date format.
    pub source_date: Option<Box<Rule>>,
    /// Target date format; `%Y-%m-%d` when unset.
    pub date: Option<String>,
    pub apply: Option<Apply>,
    pub sensitive: bool,
    pub can_skip: bool,
    pub ignore_missing_key: bool,
    pub case_insensitive: bool,
    pub field_type: Option<FieldType>,
}

/// Source value to output value mapping for a field.
pub type ValueMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    /// Rule producing the unit the source value is recorded in.
    pub source: Box<Rule>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Apply {
    pub function: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `"[a, b]"` split into components, each mapped through `values`.
    EnumList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRule {
    pub kind: CombinedKind,
    pub fields: Vec<CombinedField>,
    pub exclude_when: ExcludeWhen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinedKind {
    All,
    Any,
    Min,
    Max,
    FirstNonNull,
    List,
    Set,
}

impl CombinedKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
            Self::Min => "min",
            Self::Max => "max",
            Self::FirstNonNull => "firstNonNull",
            Self::List => "list",
            Self::Set => "set",
        }
    }

    /// `all`, `any`, `min` and `max` fold values with a reducer.
    pub fn is_reducer(self) -> bool {
        matches!(self, Self::All | Self::Any | Self::Min | Self::Max)
    }
}

impl FromStr for CombinedKind {
    type Err = SpecificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "firstNonNull" => Ok(Self::FirstNonNull),
            "list" => Ok(Self::List),
            "set" => Ok(Self::Set),
            other => Err(SpecificationError::UnknownCombinedType {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CombinedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombinedField {
    Rule(Rule),
    /// Expanded per row into one field rule for every row key the pattern matches.
    Pattern { pattern: Pattern, template: FieldRule },
}

/// Which values a `list`/`set` combination drops after flattening.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExcludeWhen {
    #[default]
    Keep,
    Null,
    FalseLike,
    Listed(Vec<Value>),
}

impl ExcludeWhen {
    fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None => Ok(Self::Keep),
            Some(Value::String(s)) if s == "none" => Ok(Self::Null),
            Some(Value::String(s)) if s == "false-like" => Ok(Self::FalseLike),
            Some(Value::Array(items)) => Ok(Self::Listed(items.clone())),
            Some(_) => Err(SpecificationError::InvalidExcludeWhen),
        }
    }
}

impl Rule {
    /// Parse a rule node. Anything that is not an object is a constant.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Ok(Self::Constant(value.clone()));
        };
        match (map.get("field"), map.get("combinedType")) {
            (Some(_), Some(_)) => Err(SpecificationError::malformed_rule(
                "rule has both 'field' and 'combinedType'",
            )),
            (Some(_), None) => Ok(Self::Field(Box::new(FieldRule::from_map(map)?))),
            (None, Some(kind)) => Ok(Self::Combined(CombinedRule::from_map(kind, map)?)),
            (None, None) => Err(SpecificationError::malformed_rule(format!(
                "rule needs 'field' or 'combinedType': {value}"
            ))),
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(Box::new(FieldRule::new(name)))
    }

    pub fn as_field(&self) -> Option<&FieldRule> {
        match self {
            Self::Field(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn combined_kind(&self) -> Option<CombinedKind> {
        match self {
            Self::Combined(rule) => Some(rule.kind),
            _ => None,
        }
    }

    /// Every source field this rule reads, including conditions and `$` parameters.
    ///
    /// Field patterns contribute nothing since their fields depend on the row.
    pub fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Constant(_) => {}
            Self::Field(rule) => rule.collect_fields(out),
            Self::Combined(rule) => {
                for field in &rule.fields {
                    match field {
                        CombinedField::Rule(rule) => rule.collect_fields(out),
                        CombinedField::Pattern { template, .. } => {
                            template.collect_dependent_fields(out);
                        }
                    }
                }
            }
        }
    }
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let field = match map.get("field") {
            Some(Value::String(field)) => field.clone(),
            Some(other) => {
                return Err(SpecificationError::malformed_rule(format!(
                    "'field' must be a string, got {other}"
                )));
            }
            None => String::new(),
        };
        Self::from_map_with_field(map, field)
    }

    fn from_map_with_field(map: &Map<String, Value>, field: String) -> Result<Self> {
        let has_unit = map.contains_key("source_unit") || map.contains_key("unit");
        let has_date = map.contains_key("source_date") || map.contains_key("date");
        if has_unit && has_date {
            return Err(SpecificationError::ConflictingConversion { field });
        }

        let unit = match (map.get("source_unit"), map.get("unit")) {
            (Some(source), Some(Value::String(target))) => Some(UnitConversion {
                source: Box::new(Rule::from_value(source)?),
                target: target.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(SpecificationError::malformed_rule(format!(
                    "field {field} needs both 'source_unit' and a string 'unit'"
                )));
            }
        };

        let values = match map.get("values") {
            None => None,
            Some(Value::Object(values)) => Some(
                values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            Some(other) => {
                return Err(SpecificationError::malformed_rule(format!(
                    "'values' for field {field} must be a mapping, got {other}"
                )));
            }
        };

        let field_type = match map.get("type") {
            None => None,
            Some(Value::String(kind)) if kind == "enum_list" => Some(FieldType::EnumList),
            Some(other) => {
                return Err(SpecificationError::malformed_rule(format!(
                    "unsupported type {other} for field {field}"
                )));
            }
        };

        Ok(Self {
            condition: map.get("if").map(Condition::from_value).transpose()?,
            values,
            unit,
            source_date: map
                .get("source_date")
                .map(|rule| Rule::from_value(rule).map(Box::new))
                .transpose()?,
            date: optional_string(map, "date")?,
            apply: map.get("apply").map(Apply::from_value).transpose()?,
            sensitive: flag(map, "sensitive"),
            can_skip: flag(map, "can_skip"),
            ignore_missing_key: flag(map, "ignoreMissingKey"),
            case_insensitive: flag(map, "caseInsensitive"),
            field_type,
            field,
        })
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        out.insert(self.field.clone());
        self.collect_dependent_fields(out);
    }

    fn collect_dependent_fields(&self, out: &mut BTreeSet<String>) {
        if let Some(condition) = &self.condition {
            condition.collect_fields(out);
        }
        if let Some(unit) = &self.unit {
            unit.source.collect_fields(out);
        }
        if let Some(source_date) = &self.source_date {
            source_date.collect_fields(out);
        }
        if let Some(apply) = &self.apply {
            for name in apply.referenced_fields() {
                out.insert(name.to_string());
            }
        }
    }
}

impl Apply {
    fn from_value(value: &Value) -> Result<Self> {
        let Some(Value::String(function)) = value.get("function") else {
            return Err(SpecificationError::malformed_rule(
                "'apply' needs a 'function' name",
            ));
        };
        let params = match value.get("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(params)) => params.clone(),
            Some(other) => {
                return Err(SpecificationError::malformed_rule(format!(
                    "'params' of {function} must be a list, got {other}"
                )));
            }
        };
        Ok(Self {
            function: function.clone(),
            params,
        })
    }

    /// Row fields referenced by `$name` parameters, including inside list parameters.
    pub fn referenced_fields(&self) -> Vec<&str> {
        fn walk<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
            match value {
                Value::String(s) => {
                    if let Some(name) = s.strip_prefix('$') {
                        out.push(name);
                    }
                }
                Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        for param in &self.params {
            walk(param, &mut out);
        }
        out
    }
}

impl CombinedRule {
    fn from_map(kind: &Value, map: &Map<String, Value>) -> Result<Self> {
        let kind = match kind {
            Value::String(name) => name.parse::<CombinedKind>()?,
            other => {
                return Err(SpecificationError::UnknownCombinedType {
                    name: other.to_string(),
                });
            }
        };
        let Some(Value::Array(fields)) = map.get("fields") else {
            return Err(SpecificationError::malformed_rule(format!(
                "combinedType {kind} needs a list of 'fields'"
            )));
        };
        let fields = fields
            .iter()
            .map(CombinedField::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind,
            fields,
            exclude_when: ExcludeWhen::from_value(map.get("excludeWhen"))?,
        })
    }
}

impl CombinedField {
    fn from_value(value: &Value) -> Result<Self> {
        if let Value::Object(map) = value
            && !map.contains_key("field")
            && let Some(pattern) = map.get("fieldPattern")
        {
            let Value::String(source) = pattern else {
                return Err(SpecificationError::malformed_rule(
                    "'fieldPattern' must be a string",
                ));
            };
            return Ok(Self::Pattern {
                pattern: Pattern::anchored(source)?,
                template: FieldRule::from_map_with_field(map, String::new())?,
            });
        }
        Rule::from_value(value).map(Self::Rule)
    }
}

/// Flags are set by any truthy value, so `"can_skip": "true"` counts.
fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).is_some_and(is_truthy)
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SpecificationError::malformed_rule(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_objects_are_constants() {
        assert_eq!(Rule::from_value(&json!("x")).expect("parse"), Rule::constant("x"));
        assert_eq!(
            Rule::from_value(&json!([1, 2])).expect("parse"),
            Rule::constant(json!([1, 2]))
        );
    }

    #[test]
    fn empty_object_is_malformed() {
        let err = Rule::from_value(&json!({})).expect_err("no tag");
        assert!(matches!(err, SpecificationError::MalformedRule { .. }));
    }

    #[test]
    fn field_rule_options() {
        let rule = Rule::from_value(&json!({
            "field": "age",
            "source_unit": {"field": "age_unit", "values": {"1": "months", "2": "years"}},
            "unit": "years",
            "can_skip": true,
            "sensitive": true
        }))
        .expect("parse");
        let field = rule.as_field().expect("field rule");
        assert!(field.can_skip && field.sensitive);
        let unit = field.unit.as_ref().expect("unit conversion");
        assert_eq!(unit.target, "years");
        assert_eq!(unit.source.as_field().map(|f| f.field.as_str()), Some("age_unit"));
    }

    #[test]
    fn flags_accept_truthy_values() {
        let rule = Rule::from_value(&json!({
            "field": "x",
            "can_skip": "true",
            "sensitive": 1,
            "ignoreMissingKey": "",
            "caseInsensitive": 0
        }))
        .expect("parse");
        let field = rule.as_field().expect("field rule");
        assert!(field.can_skip && field.sensitive);
        assert!(!field.ignore_missing_key && !field.case_insensitive);
    }

    #[test]
    fn unit_and_date_are_exclusive() {
        let err = Rule::from_value(&json!({
            "field": "x", "source_unit": "kg", "unit": "g", "date": "%Y"
        }))
        .expect_err("conflict");
        assert!(matches!(err, SpecificationError::ConflictingConversion { .. }));
    }

    #[test]
    fn combined_rule_with_pattern() {
        let rule = Rule::from_value(&json!({
            "combinedType": "set",
            "excludeWhen": "none",
            "fields": [{"fieldPattern": "flw_.*", "values": {"1": true}}, "const"]
        }))
        .expect("parse");
        let Rule::Combined(combined) = rule else {
            panic!("expected combined rule");
        };
        assert_eq!(combined.kind, CombinedKind::Set);
        assert_eq!(combined.exclude_when, ExcludeWhen::Null);
        assert!(matches!(combined.fields[0], CombinedField::Pattern { .. }));
        assert_eq!(combined.fields[1], CombinedField::Rule(Rule::constant("const")));
    }

    #[test]
    fn unknown_combined_type() {
        let err = Rule::from_value(&json!({"combinedType": "avg", "fields": []}))
            .expect_err("unknown");
        assert_eq!(err.to_string(), "unknown avg in rule");
    }

    #[test]
    fn invalid_exclude_when() {
        let err = Rule::from_value(&json!({
            "combinedType": "list", "fields": [], "excludeWhen": "zero"
        }))
        .expect_err("bad excludeWhen");
        assert!(matches!(err, SpecificationError::InvalidExcludeWhen));
    }

    #[test]
    fn collects_parameter_fields() {
        let rule = Rule::from_value(&json!({
            "field": "dob",
            "apply": {"function": "yearsElapsed", "params": ["$visit", ["$a", "b"], 19]},
            "if": {"consent": 1}
        }))
        .expect("parse");
        let mut fields = BTreeSet::new();
        rule.collect_fields(&mut fields);
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec!["a", "consent", "dob", "visit"]
        );
    }
}
