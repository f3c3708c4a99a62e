//! Parse sessions: the row loop over every table of a specification.

use std::collections::{BTreeMap, BTreeSet};

use adtl_model::value::is_blank;
use adtl_model::{
    Diagnostic, EvalContext, FieldCoverage, Row, Specification, TableBody, TableKind,
};
use adtl_spec::date_fields;
use adtl_spec::schema::property_names;
use serde_json::Value;

use crate::aggregator::TableAggregator;
use crate::default_if::default_condition;
use crate::error::{ParseError, Result};
use crate::schema_source::{LocalSchemaLoader, load_schemas};
use crate::validation::{ERROR_COLUMN, RowValidator, VALID_COLUMN, ValidationReport};

/// Holds a resolved specification and the tables accumulated from input rows.
#[derive(Debug, Clone)]
pub struct ParseSession {
    spec: Specification,
    schemas: BTreeMap<String, Value>,
    tables: BTreeMap<String, TableAggregator>,
    diagnostics: Vec<Diagnostic>,
    reports: BTreeMap<String, ValidationReport>,
    rows_seen: usize,
}

impl ParseSession {
    /// Prepare a session over `spec` with already loaded table schemas.
    ///
    /// `oneToMany` entries without an `if` get a condition synthesized from
    /// their table's schema here, so a missing schema fails before any row is read.
    pub fn new(spec: Specification, schemas: BTreeMap<String, Value>) -> Result<Self> {
        let base_ctx = EvalContext::new()
            .with_default_date_format(spec.header.default_date_format.clone())
            .with_skip_pattern(spec.skip_pattern.clone())
            .with_return_unmatched(spec.header.return_unmatched);

        let mut tables = BTreeMap::new();
        for (name, table) in &spec.tables {
            let mut table = table.clone();
            let schema = schemas.get(name);
            if let TableBody::Entries(entries) = &mut table.body {
                let discriminator = table.declaration.discriminator.as_deref();
                for (index, entry) in entries.iter_mut().enumerate() {
                    if entry.condition.is_none() {
                        entry.condition =
                            Some(default_condition(name, index, entry, schema, discriminator)?);
                    }
                }
            }
            let dates = schema.map(date_fields).unwrap_or_default();
            tables.insert(name.clone(), TableAggregator::new(table, &base_ctx, &dates));
        }

        Ok(Self {
            spec,
            schemas,
            tables,
            diagnostics: Vec::new(),
            reports: BTreeMap::new(),
            rows_seen: 0,
        })
    }

    /// Prepare a session, loading table schemas from the specification's directory.
    pub fn from_specification(spec: Specification) -> Result<Self> {
        let loader = LocalSchemaLoader::for_specification(&spec);
        let schemas = load_schemas(&spec, &loader)?;
        Self::new(spec, schemas)
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn schema(&self, table: &str) -> Option<&Value> {
        self.schemas.get(table)
    }

    /// Parse `rows` into fresh tables, discarding anything accumulated before.
    ///
    /// The first row that fails to evaluate aborts the parse.
    pub fn parse_rows<I>(&mut self, rows: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = Row>,
    {
        let _span = tracing::info_span!("adtl.parse", spec = %self.spec.name()).entered();
        self.clear();
        for row in rows {
            self.process_row(&row)?;
        }
        tracing::info!(
            rows = self.rows_seen,
            diagnostics = self.diagnostics.len(),
            "parse complete"
        );
        Ok(self)
    }

    /// Merge a single input row into every table.
    pub fn process_row(&mut self, row: &Row) -> Result<()> {
        let index = self.rows_seen;
        self.rows_seen += 1;
        let _span = tracing::debug_span!("adtl.row", index).entered();
        for aggregator in self.tables.values_mut() {
            if let Err(source) = aggregator.update(row, index, &mut self.diagnostics) {
                let fields = non_empty_fields(row);
                tracing::error!(
                    row = index,
                    table = aggregator.name(),
                    error = %source,
                    "could not evaluate row:\n{fields}"
                );
                return Err(ParseError::Row {
                    index,
                    fields,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Rows accumulated for `table`.
    pub fn read_table(&self, table: &str) -> Result<&[Row]> {
        self.aggregator(table).map(TableAggregator::rows)
    }

    /// Every table with its rows, in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables
            .iter()
            .map(|(name, aggregator)| (name.as_str(), aggregator.rows()))
    }

    /// Output columns of `table`, sorted.
    ///
    /// `oneToMany` tables use their schema's properties when a schema is
    /// loaded, otherwise every attribute any entry maps.
    pub fn fieldnames(&self, table: &str) -> Result<Vec<String>> {
        let aggregator = self.aggregator(table)?;
        let names: BTreeSet<String> = match &aggregator.table().body {
            TableBody::Constant(row) => row.keys().cloned().collect(),
            TableBody::Mapping(mapping) => mapping.keys().cloned().collect(),
            TableBody::Entries(entries) => match self.schemas.get(table) {
                Some(schema) => property_names(schema).into_iter().collect(),
                None => {
                    tracing::warn!(table, "no schema found, field names may be incomplete");
                    entries
                        .iter()
                        .flat_map(|entry| entry.attributes.keys().cloned())
                        .collect()
                }
            },
        };
        Ok(names.into_iter().collect())
    }

    /// Non-fatal findings of the current parse, in the order they were raised.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Validate every row of `table`, annotating rows with `adtl_valid` and
    /// `adtl_error`, and replace the table's report.
    pub fn validate(
        &mut self,
        table: &str,
        validator: &dyn RowValidator,
    ) -> Result<&ValidationReport> {
        let aggregator = self
            .tables
            .get_mut(table)
            .ok_or_else(|| ParseError::InvalidTable(table.to_string()))?;
        let mut report = ValidationReport::new();
        for row in aggregator.rows_mut() {
            row.remove(VALID_COLUMN);
            row.remove(ERROR_COLUMN);
            match validator.validate(row) {
                Ok(()) => {
                    row.insert(VALID_COLUMN.to_string(), Value::Bool(true));
                    report.record_valid();
                }
                Err(message) => {
                    row.insert(VALID_COLUMN.to_string(), Value::Bool(false));
                    report.record_invalid(&message);
                    row.insert(ERROR_COLUMN.to_string(), Value::String(message));
                }
            }
        }
        tracing::debug!(
            table,
            total = report.total,
            valid = report.total_valid,
            "validated table"
        );
        let slot = self.reports.entry(table.to_string()).or_default();
        *slot = report;
        Ok(slot)
    }

    /// Validation reports of every validated table.
    pub fn report(&self) -> &BTreeMap<String, ValidationReport> {
        &self.reports
    }

    /// Discard accumulated rows, diagnostics and reports.
    pub fn clear(&mut self) {
        for aggregator in self.tables.values_mut() {
            aggregator.clear();
        }
        self.diagnostics.clear();
        self.reports.clear();
        self.rows_seen = 0;
    }

    /// Source fields the specification reads.
    pub fn spec_fields(&self) -> BTreeSet<String> {
        self.spec.spec_fields()
    }

    /// Compare the fields the specification reads against an input's columns.
    pub fn check_spec_fields<I, S>(&self, headers: I) -> FieldCoverage
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.spec.check_spec_fields(headers)
    }

    pub fn table_kind(&self, table: &str) -> Result<TableKind> {
        self.aggregator(table).map(TableAggregator::kind)
    }

    fn aggregator(&self, table: &str) -> Result<&TableAggregator> {
        self.tables
            .get(table)
            .ok_or_else(|| ParseError::InvalidTable(table.to_string()))
    }
}

/// `key = value` lines for the row's non-empty fields.
fn non_empty_fields(row: &Row) -> String {
    row.iter()
        .filter(|(_, value)| !is_blank(value))
        .map(|(key, value)| format!("{key} = {}", adtl_model::value::to_text(value)))
        .collect::<Vec<_>>()
        .join("\n")
}
