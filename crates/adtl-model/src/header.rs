//! The `adtl` header object of a specification document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableKind {
    OneToOne,
    OneToMany,
    GroupBy,
    Constant,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "oneToOne",
            Self::OneToMany => "oneToMany",
            Self::GroupBy => "groupBy",
            Self::Constant => "constant",
        }
    }
}

/// Merge policy for `groupBy` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggregation {
    LastNotNull,
    /// Like `lastNotNull` but reports overwrites of a differing value.
    LastNotNullStrict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDeclaration {
    pub kind: TableKind,
    #[serde(rename = "groupBy", default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    /// Path (relative to the specification) or URL of the table's JSON Schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(
        rename = "optional-fields",
        alias = "optional_fields",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub optional_fields: Vec<String>,
    /// Attributes merged into every `oneToMany` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<Map<String, Value>>,
}

impl TableDeclaration {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            group_by: None,
            aggregation: None,
            discriminator: None,
            schema: None,
            optional_fields: Vec::new(),
            common: None,
        }
    }

    #[must_use]
    pub fn with_group_by(mut self, field: impl Into<String>, aggregation: Aggregation) -> Self {
        self.group_by = Some(field.into());
        self.aggregation = Some(aggregation);
        self
    }

    #[must_use]
    pub fn with_discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = Some(field.into());
        self
    }

    pub fn is_strict(&self) -> bool {
        self.aggregation == Some(Aggregation::LastNotNullStrict)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub description: String,
    pub tables: BTreeMap<String, TableDeclaration>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defs: Map<String, Value>,
    #[serde(rename = "include-def", default, skip_serializing_if = "Vec::is_empty")]
    pub include_def: Vec<String>,
    #[serde(rename = "defaultDateFormat", default = "default_date_format")]
    pub default_date_format: String,
    #[serde(
        rename = "skipFieldPattern",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skip_field_pattern: Option<String>,
    #[serde(rename = "returnUnmatched", default)]
    pub return_unmatched: bool,
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_defaults() {
        let header: Header = serde_json::from_value(json!({
            "name": "visits",
            "description": "Visit table",
            "tables": {
                "visit": {"kind": "groupBy", "groupBy": "subject_id", "aggregation": "lastNotNull"},
                "observation": {
                    "kind": "oneToMany",
                    "discriminator": "name",
                    "optional_fields": ["date"]
                }
            }
        }))
        .expect("deserialize header");
        assert_eq!(header.default_date_format, "%Y-%m-%d");
        assert!(!header.return_unmatched);
        assert_eq!(header.tables["visit"].kind, TableKind::GroupBy);
        assert_eq!(
            header.tables["visit"].aggregation,
            Some(Aggregation::LastNotNull)
        );
        assert_eq!(header.tables["observation"].optional_fields, vec!["date"]);
    }

    #[test]
    fn strict_aggregation() {
        let decl = TableDeclaration::new(TableKind::GroupBy)
            .with_group_by("id", Aggregation::LastNotNullStrict);
        assert!(decl.is_strict());
        assert!(!TableDeclaration::new(TableKind::OneToOne).is_strict());
    }
}
