//! End-to-end parse sessions over in-memory specifications.

use std::collections::BTreeMap;

use adtl_core::{ParseError, ParseSession};
use adtl_model::{Row, RowEvaluationError, SpecificationError};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

fn session(document: Value) -> ParseSession {
    session_with_schemas(document, BTreeMap::new())
}

fn session_with_schemas(document: Value, schemas: BTreeMap<String, Value>) -> ParseSession {
    let spec = adtl_spec::resolve(document, None, Map::new()).expect("specification");
    ParseSession::new(spec, schemas).expect("session")
}

fn symptoms_spec() -> Value {
    json!({
        "adtl": {
            "name": "symptoms",
            "description": "symptom observations",
            "tables": {"observation": {"kind": "oneToMany", "discriminator": "name"}}
        },
        "observation": [{
            "for": {"sym": ["headache", "cough", "dyspnea"]},
            "name": "{sym}",
            "date": {"field": "dt"},
            "is_present": true,
            "if": {"{sym}_cmyn": 1}
        }]
    })
}

#[test]
fn one_to_many_emits_a_row_per_matching_entry() {
    let mut session = session(symptoms_spec());
    session
        .parse_rows([row(json!({
            "dt": "2022-02-05",
            "headache_cmyn": "1",
            "cough_cmyn": "1",
            "dyspnea_cmyn": "0"
        }))])
        .expect("parse");
    assert_eq!(
        session.read_table("observation").expect("table"),
        &[
            row(json!({"date": "2022-02-05", "name": "headache", "is_present": true})),
            row(json!({"date": "2022-02-05", "name": "cough", "is_present": true})),
        ]
    );
}

#[test]
fn row_errors_name_the_row_and_its_fields() {
    let mut session = session(symptoms_spec());
    let err = session
        .parse_rows([
            row(json!({"dt": "2022-02-05", "headache_cmyn": "0", "cough_cmyn": "0", "dyspnea_cmyn": "0"})),
            row(json!({"dt": "2022-02-06", "headache_cmyn": "1", "cough_cmyn": ""})),
        ])
        .map(|_| ())
        .expect_err("missing field");
    let (index, fields, source) = match err {
        ParseError::Row {
            index,
            fields,
            source,
        } => (index, fields, source),
        other => panic!("expected a row error, got {other}"),
    };
    assert_eq!(index, 1);
    assert_eq!(fields, "dt = 2022-02-06\nheadache_cmyn = 1");
    assert_eq!(
        source,
        RowEvaluationError::MissingField {
            field: "dyspnea_cmyn".to_string()
        }
    );
}

#[test]
fn default_conditions_come_from_the_schema() {
    let document = json!({
        "adtl": {
            "name": "symptoms",
            "description": "symptom observations",
            "defaultDateFormat": "%d/%m/%Y",
            "tables": {"observation": {"kind": "oneToMany", "discriminator": "name"}}
        },
        "observation": [
            {
                "name": "headache",
                "date": {"field": "dt"},
                "is_present": {"field": "headache_cmyn", "values": {"1": true, "0": false}}
            },
            {
                "name": "temperature",
                "date": {"field": "dt"},
                "value": {"field": "temp"}
            }
        ]
    });
    let schema = json!({
        "properties": {"name": {}, "date": {"type": "string", "format": "date"}, "is_present": {}, "value": {}},
        "oneOf": [
            {"required": ["name", "is_present"]},
            {"required": ["name", "value"]}
        ]
    });
    let mut session =
        session_with_schemas(document, BTreeMap::from([("observation".to_string(), schema)]));
    session
        .parse_rows([
            row(json!({"dt": "05/02/2022", "headache_cmyn": "0", "temp": ""})),
            row(json!({"dt": "06/02/2022", "headache_cmyn": "", "temp": "37.5"})),
        ])
        .expect("parse");
    assert_eq!(
        session.read_table("observation").expect("table"),
        &[
            row(json!({"date": "2022-02-05", "name": "headache", "is_present": false})),
            row(json!({"date": "2022-02-06", "name": "temperature", "value": 37.5})),
        ]
    );
    assert_eq!(
        session.fieldnames("observation").expect("fieldnames"),
        vec!["date", "is_present", "name", "value"]
    );
}

#[test]
fn entries_without_if_need_a_schema() {
    let spec = adtl_spec::resolve(
        json!({
            "adtl": {
                "name": "s",
                "description": "d",
                "tables": {"obs": {"kind": "oneToMany", "discriminator": "name"}}
            },
            "obs": [{"name": "x", "value": {"field": "v"}}]
        }),
        None,
        Map::new(),
    )
    .expect("specification");
    let err = ParseSession::new(spec, BTreeMap::new()).expect_err("no schema");
    assert!(matches!(
        err,
        ParseError::Schema(SpecificationError::DefaultIf { index: 0, .. })
    ));
}

#[test]
fn constant_tables_hold_their_body() {
    let mut session = session(json!({
        "adtl": {
            "name": "s",
            "description": "d",
            "tables": {
                "dataset": {"kind": "constant"},
                "visit": {"kind": "oneToOne"}
            }
        },
        "dataset": {"source": "site-a", "version": 2},
        "visit": {"id": {"field": "id"}}
    }));
    let constant = row(json!({"source": "site-a", "version": 2}));
    assert_eq!(session.read_table("dataset").expect("table"), &[constant.clone()]);
    session
        .parse_rows([row(json!({"id": "1"})), row(json!({"id": "2"}))])
        .expect("parse");
    assert_eq!(session.read_table("dataset").expect("table"), &[constant]);
    assert_eq!(session.read_table("visit").expect("table").len(), 2);
    assert_eq!(session.fieldnames("dataset").expect("fields"), vec!["source", "version"]);
    assert!(matches!(
        session.read_table("missing"),
        Err(ParseError::InvalidTable(name)) if name == "missing"
    ));
}

#[test]
fn parse_rows_starts_from_empty_tables() {
    let mut session = session(json!({
        "adtl": {"name": "s", "description": "d", "tables": {"visit": {"kind": "oneToOne"}}},
        "visit": {"id": {"field": "id"}}
    }));
    session.parse_rows([row(json!({"id": "1"}))]).expect("parse");
    session.parse_rows([row(json!({"id": "2"}))]).expect("parse");
    assert_eq!(session.read_table("visit").expect("table"), &[row(json!({"id": 2}))]);
    session.process_row(&row(json!({"id": "3"}))).expect("row");
    assert_eq!(session.read_table("visit").expect("table").len(), 2);
    session.clear();
    assert!(session.read_table("visit").expect("table").is_empty());
}

#[test]
fn strict_group_by_collects_diagnostics() {
    let mut session = session(json!({
        "adtl": {
            "name": "s",
            "description": "d",
            "tables": {
                "subject": {"kind": "groupBy", "groupBy": "subject_id", "aggregation": "lastNotNullStrict"}
            }
        },
        "subject": {"subject_id": {"field": "id"}, "sex": {"field": "sex"}}
    }));
    session
        .parse_rows([
            row(json!({"id": "1", "sex": "F"})),
            row(json!({"id": "1", "sex": "M"})),
            row(json!({"id": "2", "sex": "M"})),
        ])
        .expect("parse");
    assert_eq!(
        session.read_table("subject").expect("table"),
        &[
            row(json!({"subject_id": 1, "sex": "M"})),
            row(json!({"subject_id": 2, "sex": "M"}))
        ]
    );
    let diagnostics = session.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].table.as_deref(), Some("subject"));
    assert_eq!(diagnostics[0].attribute.as_deref(), Some("sex"));
    assert_eq!(diagnostics[0].row, Some(1));
}

#[test]
fn validation_report() {
    let mut session = session(json!({
        "adtl": {"name": "s", "description": "d", "tables": {"visit": {"kind": "oneToOne"}}},
        "visit": {"id": {"field": "id"}, "age": {"field": "age"}}
    }));
    session
        .parse_rows([
            row(json!({"id": "1", "age": "30"})),
            row(json!({"id": "2", "age": ""})),
            row(json!({"id": "3", "age": ""})),
        ])
        .expect("parse");
    let requires_age = |row: &Row| {
        if row.contains_key("age") {
            Ok(())
        } else {
            Err("data must contain ['age'] properties".to_string())
        }
    };
    let report = session.validate("visit", &requires_age).expect("validate");
    assert_eq!(report.total, 3);
    assert_eq!(report.total_valid, 1);
    let rows = session.read_table("visit").expect("table");
    assert_eq!(rows[0]["adtl_valid"], json!(true));
    assert_eq!(rows[1]["adtl_valid"], json!(false));
    assert_eq!(rows[1]["adtl_error"], json!("data must contain ['age'] properties"));
    insta::assert_json_snapshot!(session.report());
}

#[test]
fn spec_field_coverage() {
    let session = session(symptoms_spec());
    let coverage = session.check_spec_fields(["dt", "headache_cmyn", "cough_cmyn", "subjid"]);
    assert_eq!(coverage.missing, vec!["dyspnea_cmyn"]);
    assert_eq!(coverage.unused, vec!["subjid"]);
}

fn group_spec() -> Value {
    json!({
        "adtl": {
            "name": "s",
            "description": "d",
            "tables": {"subject": {"kind": "groupBy", "groupBy": "subject_id", "aggregation": "lastNotNull"}}
        },
        "subject": {
            "subject_id": {"field": "id"},
            "first_visit": {"combinedType": "firstNonNull", "fields": [{"field": "visit"}]},
            "symptoms": {"combinedType": "set", "excludeWhen": "none", "fields": [{"field": "sym"}]}
        }
    })
}

fn symptoms_of(session: &ParseSession) -> Vec<String> {
    let rows = session.read_table("subject").expect("table");
    let mut symptoms: Vec<String> = rows[0]["symptoms"]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    symptoms.sort();
    symptoms
}

proptest! {
    #[test]
    fn set_merge_is_order_independent(
        symptoms in Just(vec!["cough", "fever", "rash", "cough", "headache"]).prop_shuffle()
    ) {
        let rows = |order: &[&str]| -> Vec<Row> {
            order.iter().map(|sym| row(json!({"id": "1", "visit": "", "sym": sym}))).collect()
        };
        let mut shuffled = session(group_spec());
        shuffled.parse_rows(rows(&symptoms)).expect("parse");
        let mut sorted_order = symptoms.clone();
        sorted_order.sort_unstable();
        let mut sorted = session(group_spec());
        sorted.parse_rows(rows(&sorted_order)).expect("parse");
        prop_assert_eq!(symptoms_of(&shuffled), symptoms_of(&sorted));
        prop_assert_eq!(symptoms_of(&shuffled), vec!["cough", "fever", "headache", "rash"]);
    }

    #[test]
    fn first_non_null_keeps_the_first_value(visits in prop::collection::vec("(v[0-9])?", 1..8)) {
        let mut session = session(group_spec());
        let rows = visits.iter().map(|visit| row(json!({"id": "1", "visit": visit, "sym": ""})));
        session.parse_rows(rows).expect("parse");
        let first = visits.iter().find(|visit| !visit.is_empty());
        let stored = session.read_table("subject").expect("table")[0].get("first_visit").cloned();
        prop_assert_eq!(stored, first.map(|visit| json!(visit)));
    }
}
