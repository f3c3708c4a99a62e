//! Per-table accumulation of evaluated rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use adtl_model::value::{remove_null_keys, values_equal};
use adtl_model::{
    Diagnostic, Entry, EvalContext, EvalResult, Mapping, Row, Table, TableBody, TableKind,
};
use adtl_transform::{evaluate, holds, merge_combined};
use serde_json::Value;

/// Accumulated output of one table, fed one input row at a time.
#[derive(Debug, Clone)]
pub struct TableAggregator {
    table: Table,
    /// Context per attribute; attributes are evaluated with these only.
    contexts: BTreeMap<String, EvalContext>,
    base_ctx: EvalContext,
    state: TableState,
}

#[derive(Debug, Clone)]
enum TableState {
    Rows(Vec<Row>),
    Groups(GroupedRows),
}

/// groupBy rows in first-seen order, indexed by the serialized group key.
#[derive(Debug, Clone, Default)]
struct GroupedRows {
    rows: Vec<Row>,
    index: HashMap<String, usize>,
}

impl GroupedRows {
    fn group(&mut self, key: &Value) -> &mut Row {
        let next = self.rows.len();
        let slot = *self.index.entry(key.to_string()).or_insert(next);
        if slot == next {
            self.rows.push(Row::new());
        }
        &mut self.rows[slot]
    }
}

impl TableAggregator {
    /// Build the aggregator for `table`, deriving one context per attribute.
    ///
    /// Attributes listed in `date_fields` are evaluated as dates.
    pub fn new(table: Table, base_ctx: &EvalContext, date_fields: &BTreeSet<String>) -> Self {
        let contexts = attribute_names(&table)
            .into_iter()
            .map(|attribute| {
                let ctx = base_ctx.clone().with_date(date_fields.contains(&attribute));
                (attribute, ctx)
            })
            .collect();
        let state = initial_state(&table);
        Self {
            table,
            contexts,
            base_ctx: base_ctx.clone(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn kind(&self) -> TableKind {
        self.table.kind()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Context an attribute is evaluated with.
    pub fn context(&self, attribute: &str) -> &EvalContext {
        self.contexts.get(attribute).unwrap_or(&self.base_ctx)
    }

    pub fn rows(&self) -> &[Row] {
        match &self.state {
            TableState::Rows(rows) => rows,
            TableState::Groups(groups) => &groups.rows,
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        match &mut self.state {
            TableState::Rows(rows) => rows,
            TableState::Groups(groups) => &mut groups.rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Drop accumulated rows. Constant tables keep their single row.
    pub fn clear(&mut self) {
        self.state = initial_state(&self.table);
    }

    /// Merge one input row into the table.
    ///
    /// `lastNotNullStrict` overwrites are reported through `diagnostics`.
    pub fn update(
        &mut self,
        row: &Row,
        row_index: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EvalResult<()> {
        let Self {
            table,
            contexts,
            base_ctx,
            state,
        } = self;
        let (table, contexts, base_ctx) = (&*table, &*contexts, &*base_ctx);
        let ctx = |attribute: &str| -> &EvalContext { contexts.get(attribute).unwrap_or(base_ctx) };
        match (&table.body, state) {
            (TableBody::Constant(_), _) => Ok(()),
            (TableBody::Mapping(mapping), TableState::Groups(groups)) => {
                let Some(group_by) = table.declaration.group_by.as_deref() else {
                    return Ok(());
                };
                let update = GroupUpdate {
                    table: &table.name,
                    strict: table.declaration.is_strict(),
                    row_index,
                };
                update.apply(row, mapping, group_by, &ctx, groups, diagnostics)
            }
            (TableBody::Mapping(mapping), TableState::Rows(rows)) => {
                rows.push(evaluate_mapping(row, mapping.iter(), &ctx)?);
                Ok(())
            }
            (TableBody::Entries(entries), TableState::Rows(rows)) => {
                for entry in entries {
                    if entry_applies(row, entry, base_ctx)? {
                        rows.push(evaluate_mapping(row, entry.attributes.iter(), &ctx)?);
                    }
                }
                Ok(())
            }
            (TableBody::Entries(_), TableState::Groups(_)) => Ok(()),
        }
    }
}

struct GroupUpdate<'a> {
    table: &'a str,
    strict: bool,
    row_index: usize,
}

impl GroupUpdate<'_> {
    fn apply<'c>(
        &self,
        row: &Row,
        mapping: &Mapping,
        group_by: &str,
        ctx: &impl Fn(&str) -> &'c EvalContext,
        groups: &mut GroupedRows,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EvalResult<()> {
        let Some(key_rule) = mapping.get(group_by) else {
            return Ok(());
        };
        let key = evaluate(row, key_rule, ctx(group_by))?;
        for (attribute, rule) in mapping {
            let value = evaluate(row, rule, ctx(attribute))?;
            if value.is_null() || value.as_array().is_some_and(Vec::is_empty) {
                continue;
            }
            let group = groups.group(&key);
            let Some(existing) = group.remove(attribute) else {
                group.insert(attribute.clone(), value);
                continue;
            };
            let merged = match rule.combined_kind() {
                Some(kind) => merge_combined(kind, existing, value)?,
                None => {
                    if self.strict && !values_equal(&existing, &value) {
                        tracing::warn!(
                            table = self.table,
                            attribute = %attribute,
                            group = %key,
                            previous = %existing,
                            value = %value,
                            "lastNotNullStrict: overwriting a different value"
                        );
                        diagnostics.push(
                            Diagnostic::warning(format!(
                                "{attribute} for group {key} overwritten: {existing} -> {value}"
                            ))
                            .with_table(self.table)
                            .with_attribute(attribute.as_str())
                            .with_row(self.row_index)
                            .with_change(existing, value.clone()),
                        );
                    } else {
                        tracing::debug!(
                            table = self.table,
                            attribute = %attribute,
                            "multiple rows for group without combinedType, overwriting"
                        );
                    }
                    value
                }
            };
            group.insert(attribute.clone(), merged);
        }
        Ok(())
    }
}

fn entry_applies(row: &Row, entry: &Entry, ctx: &EvalContext) -> EvalResult<bool> {
    match &entry.condition {
        Some(condition) => holds(row, condition, ctx),
        None => Ok(true),
    }
}

fn evaluate_mapping<'a, 'c>(
    row: &Row,
    attributes: impl Iterator<Item = (&'a String, &'a adtl_model::Rule)>,
    ctx: &impl Fn(&str) -> &'c EvalContext,
) -> EvalResult<Row> {
    let mut out = Row::new();
    for (attribute, rule) in attributes {
        out.insert(attribute.clone(), evaluate(row, rule, ctx(attribute))?);
    }
    Ok(remove_null_keys(out))
}

fn initial_state(table: &Table) -> TableState {
    match &table.body {
        TableBody::Constant(row) => TableState::Rows(vec![row.clone()]),
        _ if table.kind() == TableKind::GroupBy => TableState::Groups(GroupedRows::default()),
        _ => TableState::Rows(Vec::new()),
    }
}

fn attribute_names(table: &Table) -> BTreeSet<String> {
    match &table.body {
        TableBody::Constant(row) => row.keys().cloned().collect(),
        TableBody::Mapping(mapping) => mapping.keys().cloned().collect(),
        TableBody::Entries(entries) => entries
            .iter()
            .flat_map(|entry| entry.attributes.keys().cloned())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adtl_model::{Aggregation, TableDeclaration};
    use serde_json::json;

    fn row(value: Value) -> Row {
        let Value::Object(map) = value else {
            unreachable!("fixture is an object");
        };
        map
    }

    fn group_table(aggregation: Aggregation) -> TableAggregator {
        let declaration =
            TableDeclaration::new(TableKind::GroupBy).with_group_by("subject_id", aggregation);
        let table = Table::from_value(
            "subject",
            declaration,
            &json!({
                "subject_id": {"field": "id"},
                "weight": {"field": "weight"},
                "first_visit": {"combinedType": "firstNonNull", "fields": [{"field": "visit"}]},
                "symptoms": {
                    "combinedType": "set",
                    "excludeWhen": "none",
                    "fields": [{"field": "sym"}]
                }
            }),
        )
        .expect("table");
        TableAggregator::new(table, &EvalContext::default(), &BTreeSet::new())
    }

    #[test]
    fn group_by_merges_rows_sharing_a_key() {
        let mut aggregator = group_table(Aggregation::LastNotNull);
        let mut diagnostics = Vec::new();
        for (index, input) in [
            json!({"id": "1", "weight": "60", "visit": "v1", "sym": "cough"}),
            json!({"id": "2", "weight": "", "visit": "", "sym": ""}),
            json!({"id": "1", "weight": "62", "visit": "v2", "sym": "fever"}),
            json!({"id": "1", "weight": "", "visit": "v3", "sym": "cough"}),
        ]
        .into_iter()
        .enumerate()
        {
            aggregator
                .update(&row(input), index, &mut diagnostics)
                .expect("update");
        }
        assert_eq!(
            aggregator.rows(),
            &[
                row(json!({
                    "subject_id": 1,
                    "weight": 62,
                    "first_visit": "v1",
                    "symptoms": ["cough", "fever"]
                })),
                row(json!({"subject_id": 2})),
            ]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn strict_aggregation_reports_changed_values() {
        let mut aggregator = group_table(Aggregation::LastNotNullStrict);
        let mut diagnostics = Vec::new();
        for (index, weight) in ["60", "60", "65"].into_iter().enumerate() {
            let input = row(json!({"id": "1", "weight": weight, "visit": "", "sym": ""}));
            aggregator
                .update(&input, index, &mut diagnostics)
                .expect("update");
        }
        assert_eq!(aggregator.rows()[0]["weight"], json!(65));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].row, Some(2));
        assert_eq!(diagnostics[0].previous, Some(json!(60)));
        assert_eq!(diagnostics[0].value, Some(json!(65)));
    }

    #[test]
    fn one_to_one_drops_null_attributes() {
        let table = Table::from_value(
            "visit",
            TableDeclaration::new(TableKind::OneToOne),
            &json!({"id": {"field": "id"}, "note": {"field": "note"}, "source": "site-a"}),
        )
        .expect("table");
        let mut aggregator = TableAggregator::new(table, &EvalContext::default(), &BTreeSet::new());
        aggregator
            .update(&row(json!({"id": "7", "note": ""})), 0, &mut Vec::new())
            .expect("update");
        assert_eq!(aggregator.rows(), &[row(json!({"id": 7, "source": "site-a"}))]);
        aggregator.clear();
        assert!(aggregator.is_empty());
    }

    #[test]
    fn date_attributes_get_date_context() {
        let table = Table::from_value(
            "visit",
            TableDeclaration::new(TableKind::OneToOne),
            &json!({"date_admission": {"field": "dt"}, "raw": {"field": "dt"}}),
        )
        .expect("table");
        let base = EvalContext::default().with_default_date_format("%d/%m/%Y");
        let dates = BTreeSet::from(["date_admission".to_string()]);
        let mut aggregator = TableAggregator::new(table, &base, &dates);
        aggregator
            .update(&row(json!({"dt": "05/02/2022"})), 0, &mut Vec::new())
            .expect("update");
        assert_eq!(
            aggregator.rows(),
            &[row(json!({"date_admission": "2022-02-05", "raw": "05/02/2022"}))]
        );
    }
}
