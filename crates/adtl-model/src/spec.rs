//! Fully resolved specification: header plus typed table bodies.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::Value;

use crate::condition::Condition;
use crate::error::{Result, SpecificationError};
use crate::header::{Header, TableDeclaration, TableKind};
use crate::pattern::Pattern;
use crate::rule::Rule;
use crate::value::Row;

/// Attribute name to rule, for one output row shape.
pub type Mapping = BTreeMap<String, Rule>;

#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    pub header: Header,
    pub skip_pattern: Option<Pattern>,
    pub tables: BTreeMap<String, Table>,
    /// Directory of the specification file; relative schema paths resolve against it.
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub declaration: TableDeclaration,
    pub body: TableBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableBody {
    /// Emitted verbatim as the table's single row.
    Constant(Row),
    /// `oneToOne` and `groupBy` bodies.
    Mapping(Mapping),
    /// `oneToMany` bodies, in declaration order.
    Entries(Vec<Entry>),
}

/// One rule block of a `oneToMany` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Explicit `if`, or the synthesized default once a session is built.
    pub condition: Option<Condition>,
    pub attributes: Mapping,
}

/// Source fields referenced by a specification compared against an input header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldCoverage {
    /// Referenced by the specification but absent from the input.
    pub missing: Vec<String>,
    /// Present in the input but never referenced.
    pub unused: Vec<String>,
}

impl Specification {
    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Every source field any rule or condition reads.
    pub fn spec_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        for table in self.tables.values() {
            match &table.body {
                TableBody::Constant(_) => {}
                TableBody::Mapping(mapping) => {
                    for rule in mapping.values() {
                        rule.collect_fields(&mut fields);
                    }
                }
                TableBody::Entries(entries) => {
                    for entry in entries {
                        if let Some(condition) = &entry.condition {
                            condition.collect_fields(&mut fields);
                        }
                        for rule in entry.attributes.values() {
                            rule.collect_fields(&mut fields);
                        }
                    }
                }
            }
        }
        fields
    }

    /// Compare the referenced fields against the columns an input provides.
    pub fn check_spec_fields<I, S>(&self, headers: I) -> FieldCoverage
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let spec_fields = self.spec_fields();
        let headers: BTreeSet<String> = headers
            .into_iter()
            .map(|header| header.as_ref().to_string())
            .collect();
        FieldCoverage {
            missing: spec_fields.difference(&headers).cloned().collect(),
            unused: headers.difference(&spec_fields).cloned().collect(),
        }
    }
}

impl Table {
    /// Build a typed table from its declaration and resolved body.
    pub fn from_value(name: &str, declaration: TableDeclaration, body: &Value) -> Result<Self> {
        let body = match declaration.kind {
            TableKind::Constant => {
                let Value::Object(row) = body else {
                    return Err(shape(name, "a mapping"));
                };
                TableBody::Constant(row.clone())
            }
            TableKind::OneToOne | TableKind::GroupBy => {
                let Value::Object(map) = body else {
                    return Err(shape(name, "a mapping of attributes to rules"));
                };
                let mapping = parse_mapping(name, "", map.iter())?;
                if let Some(group_by) = &declaration.group_by
                    && !mapping.contains_key(group_by)
                {
                    return Err(SpecificationError::UnmappedGroupByField {
                        table: name.to_string(),
                        field: group_by.clone(),
                    });
                }
                TableBody::Mapping(mapping)
            }
            TableKind::OneToMany => {
                let Value::Array(items) = body else {
                    return Err(shape(name, "a list of rule blocks"));
                };
                let entries = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Entry::from_value(name, index, item))
                    .collect::<Result<Vec<_>>>()?;
                TableBody::Entries(entries)
            }
        };
        Ok(Self {
            name: name.to_string(),
            declaration,
            body,
        })
    }

    pub fn kind(&self) -> TableKind {
        self.declaration.kind
    }
}

impl Entry {
    fn from_value(table: &str, index: usize, value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(shape(table, "rule blocks to be mappings"));
        };
        let prefix = format!("[{index}].");
        let condition = map
            .get("if")
            .map(Condition::from_value)
            .transpose()
            .map_err(|err| err.in_attribute(table, format!("{prefix}if")))?;
        let attributes = parse_mapping(
            table,
            &prefix,
            map.iter().filter(|(key, _)| key.as_str() != "if"),
        )?;
        Ok(Self {
            condition,
            attributes,
        })
    }
}

fn parse_mapping<'a>(
    table: &str,
    prefix: &str,
    items: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Result<Mapping> {
    items
        .map(|(attribute, rule)| {
            Rule::from_value(rule)
                .map(|rule| (attribute.clone(), rule))
                .map_err(|err| err.in_attribute(table, format!("{prefix}{attribute}")))
        })
        .collect()
}

fn shape(table: &str, expected: &'static str) -> SpecificationError {
    SpecificationError::TableShape {
        table: table.to_string(),
        expected,
    }
}
