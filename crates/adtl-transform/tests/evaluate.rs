//! Rule evaluation against rows.

use adtl_model::{EvalContext, Pattern, Row, RowEvaluationError, Rule};
use adtl_transform::{evaluate, evaluate_raw, sha256_hex};
use proptest::prelude::*;
use serde_json::{Value, json};

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

fn rule(value: Value) -> Rule {
    Rule::from_value(&value).expect("rule")
}

fn eval(row_value: Value, rule_value: Value) -> Result<Value, RowEvaluationError> {
    evaluate(&row(row_value), &rule(rule_value), &EvalContext::default())
}

#[test]
fn skippable_field_missing_from_row() {
    assert_eq!(eval(json!({}), json!({"field": "x", "can_skip": true})), Ok(Value::Null));
    assert_eq!(
        eval(json!({}), json!({"field": "x"})),
        Err(RowEvaluationError::MissingField {
            field: "x".to_string()
        })
    );
}

#[test]
fn string_flags_count_as_set() {
    assert_eq!(eval(json!({}), json!({"field": "x", "can_skip": "true"})), Ok(Value::Null));
    assert_eq!(
        eval(json!({"id": "a"}), json!({"field": "id", "sensitive": "yes"})),
        Ok(Value::String(sha256_hex(b"a")))
    );
}

#[test]
fn skip_pattern_from_context() {
    let ctx = EvalContext::default().with_skip_pattern(Some(Pattern::anchored("opt_").expect("re")));
    let value = evaluate(&Row::new(), &rule(json!({"field": "opt_weight"})), &ctx);
    assert_eq!(value, Ok(Value::Null));
}

#[test]
fn condition_gates_field() {
    let rule_value = json!({"field": "weight", "if": {"weight_cmyn": 1}});
    assert_eq!(eval(json!({"weight": "70", "weight_cmyn": "1"}), rule_value.clone()), Ok(json!(70)));
    assert_eq!(eval(json!({"weight": "70", "weight_cmyn": "0"}), rule_value), Ok(Value::Null));
}

#[test]
fn numeric_coercion_applies_to_fields_not_constants() {
    assert_eq!(eval(json!({"a": "12"}), json!({"field": "a"})), Ok(json!(12)));
    assert_eq!(eval(json!({"a": "12.5"}), json!({"field": "a"})), Ok(json!(12.5)));
    assert_eq!(eval(json!({"a": "12a"}), json!({"field": "a"})), Ok(json!("12a")));
    assert_eq!(evaluate_raw(&row(json!({"a": "12"})), &rule(json!({"field": "a"})), &EvalContext::default()), Ok(json!("12")));
    assert_eq!(eval(json!({}), json!("12")), Ok(json!("12")));
    assert_eq!(eval(json!({"a": ""}), json!({"field": "a"})), Ok(Value::Null));
}

#[test]
fn values_mapping() {
    let sex = json!({"field": "sex", "values": {"1": "male", "2": "female", "9": ""}});
    assert_eq!(eval(json!({"sex": "1"}), sex.clone()), Ok(json!("male")));
    assert_eq!(eval(json!({"sex": "9"}), sex.clone()), Ok(Value::Null));
    assert_eq!(eval(json!({"sex": "3"}), sex), Ok(Value::Null));

    let lenient = json!({"field": "sex", "values": {"1": "male"}, "ignoreMissingKey": true});
    assert_eq!(eval(json!({"sex": "other"}), lenient), Ok(json!("other")));

    let insensitive = json!({"field": "ans", "values": {"Yes": true, "No": false}, "caseInsensitive": true});
    assert_eq!(eval(json!({"ans": " YES "}), insensitive), Ok(json!(true)));
}

#[test]
fn return_unmatched_passes_unmapped_values() {
    let ctx = EvalContext::default().with_return_unmatched(true);
    let value = evaluate(
        &row(json!({"sex": "unknown"})),
        &rule(json!({"field": "sex", "values": {"1": "male"}})),
        &ctx,
    );
    assert_eq!(value, Ok(json!("unknown")));
}

#[test]
fn enum_list_maps_each_component() {
    let rule_value = json!({
        "field": "symptoms",
        "type": "enum_list",
        "values": {"1": "fever", "2": "cough"}
    });
    assert_eq!(
        eval(json!({"symptoms": "[1, 2, 3]"}), rule_value),
        Ok(json!(["fever", "cough", null]))
    );
}

#[test]
fn unit_conversion_by_source_unit_rule() {
    let rule_value = json!({
        "field": "age",
        "source_unit": {"field": "age_unit", "values": {"1": "months", "2": "years"}},
        "unit": "years"
    });
    assert_eq!(eval(json!({"age": 18, "age_unit": "1"}), rule_value.clone()), Ok(json!(1.5)));
    let years = eval(json!({"age": 18, "age_unit": "2"}), rule_value.clone()).expect("years");
    assert_eq!(years.as_f64(), Some(18.0));
    // An unmapped unit is not a string, so the value is taken as already converted.
    let raw = eval(json!({"age": "18", "age_unit": "7"}), rule_value).expect("raw");
    assert_eq!(raw.as_f64(), Some(18.0));
}

#[test]
fn unit_conversion_failures() {
    let rule_value = json!({"field": "w", "source_unit": "furlong", "unit": "kg"});
    assert!(matches!(
        eval(json!({"w": "3"}), rule_value.clone()),
        Err(RowEvaluationError::UnitConversion { .. })
    ));
    let ctx = EvalContext::default().with_return_unmatched(true);
    assert_eq!(
        evaluate(&row(json!({"w": "3"})), &rule(rule_value), &ctx),
        Ok(json!(3))
    );
}

#[test]
fn date_reformatting() {
    let explicit = json!({"field": "dt", "source_date": "%d/%m/%Y", "date": "%m/%d/%Y"});
    assert_eq!(eval(json!({"dt": "02/05/2022"}), explicit), Ok(json!("05/02/2022")));
    let iso = json!({"field": "dt", "source_date": "%d/%m/%Y"});
    assert_eq!(eval(json!({"dt": "02/05/2022"}), iso.clone()), Ok(json!("2022-05-02")));
    assert_eq!(eval(json!({"dt": "2022-05-02"}), iso), Ok(Value::Null));
}

#[test]
fn date_fields_use_default_format() {
    let ctx = EvalContext::default()
        .with_date(true)
        .with_default_date_format("%d/%m/%Y");
    let value = evaluate(&row(json!({"dt": "31/12/2021"})), &rule(json!({"field": "dt"})), &ctx);
    assert_eq!(value, Ok(json!("2021-12-31")));
    let passthrough = ctx.with_return_unmatched(true);
    let value = evaluate(&row(json!({"dt": "unknown"})), &rule(json!({"field": "dt"})), &passthrough);
    assert_eq!(value, Ok(json!("unknown")));
}

#[test]
fn sensitive_values_are_hashed_last() {
    let rule_value = json!({"field": "id", "sensitive": true, "values": {"a": "patient-1"}});
    assert_eq!(
        eval(json!({"id": "a"}), rule_value.clone()),
        Ok(Value::String(sha256_hex(b"patient-1")))
    );
    assert_eq!(eval(json!({"id": "b"}), rule_value), Ok(Value::Null));
}

#[test]
fn apply_with_row_parameters() {
    let rule_value = json!({
        "field": "dob",
        "apply": {"function": "yearsElapsed", "params": ["$visit_date", 2022]}
    });
    let age = eval(json!({"dob": "2000-01-01", "visit_date": "2020-01-01"}), rule_value.clone())
        .expect("age");
    let age = age.as_f64().expect("float");
    assert!((age - 20.0).abs() < 0.01, "age was {age}");
    assert_eq!(
        eval(json!({"dob": "2000-01-01"}), rule_value),
        Err(RowEvaluationError::MissingParameterField {
            field: "visit_date".to_string()
        })
    );
}

#[test]
fn apply_unmatched_policy() {
    let rule_value = json!({
        "field": "sym",
        "apply": {"function": "wordSubstituteSet", "params": [["fever", "fever"]]}
    });
    assert_eq!(eval(json!({"sym": "rash"}), rule_value.clone()), Ok(Value::Null));
    let ctx = EvalContext::default().with_return_unmatched(true);
    assert_eq!(
        evaluate(&row(json!({"sym": "rash"})), &rule(rule_value), &ctx),
        Ok(json!("rash"))
    );
}

#[test]
fn unknown_function() {
    let err = eval(json!({"a": "1"}), json!({"field": "a", "apply": {"function": "nope"}}))
        .expect_err("unknown function");
    assert_eq!(
        err.to_string(),
        "Error using a data transformation: Function nope has not been defined."
    );
}

#[test]
fn list_and_set_exclusion() {
    let base = json!({"mildliv": 0, "modliv": 2});
    let list = |exclude: Option<Value>| {
        let mut rule_value = json!({
            "combinedType": "list",
            "fields": [{"field": "mildliv"}, {"field": "modliv"}]
        });
        if let Some(exclude) = exclude {
            rule_value["excludeWhen"] = exclude;
        }
        eval(base.clone(), rule_value)
    };
    assert_eq!(list(None), Ok(json!([0, 2])));
    assert_eq!(list(Some(json!("false-like"))), Ok(json!([2])));
    assert_eq!(list(Some(json!([2]))), Ok(json!([0])));
    assert_eq!(
        eval(
            json!({"a": "", "b": "x"}),
            json!({"combinedType": "set", "fields": [{"field": "a"}, {"field": "b"}, {"field": "b"}], "excludeWhen": "none"})
        ),
        Ok(json!(["x"]))
    );
}

#[test]
fn first_non_null_is_lazy() {
    let rule_value = json!({
        "combinedType": "firstNonNull",
        "fields": [{"field": "a"}, {"field": "b"}, {"field": "missing"}]
    });
    assert_eq!(eval(json!({"a": "", "b": "2"}), rule_value.clone()), Ok(json!(2)));
    assert!(eval(json!({"a": "", "b": ""}), rule_value).is_err());
}

#[test]
fn reducers_over_sub_rules() {
    let any = json!({"combinedType": "any", "fields": [
        {"field": "a", "values": {"1": true, "0": false}},
        {"field": "b", "values": {"1": true, "0": false}}
    ]});
    assert_eq!(eval(json!({"a": "0", "b": "1"}), any.clone()), Ok(json!(true)));
    assert_eq!(eval(json!({"a": "", "b": ""}), any), Ok(Value::Null));
    let max = json!({"combinedType": "max", "fields": [{"field": "a"}, {"field": "b"}]});
    assert_eq!(eval(json!({"a": "9", "b": "10"}), max), Ok(json!(10)));
}

#[test]
fn field_pattern_matches_row_keys() {
    let rule_value = json!({
        "combinedType": "list",
        "excludeWhen": "none",
        "fields": [{"fieldPattern": "sym_", "values": {"1": "yes"}}]
    });
    assert_eq!(
        eval(json!({"sym_a": "1", "sym_b": "2", "other": "1"}), rule_value),
        Ok(json!(["yes"]))
    );
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,8}".prop_map(Value::from),
    ]
}

proptest! {
    #[test]
    fn constants_evaluate_to_themselves(constant in scalar(), text in "[a-z0-9]{0,6}") {
        let source = row(json!({"a": text}));
        prop_assert_eq!(
            evaluate(&source, &Rule::Constant(constant.clone()), &EvalContext::default()),
            Ok(constant)
        );
    }

    #[test]
    fn evaluation_is_pure(a in "[0-9]{0,3}", b in "[a-z0-9]{0,3}") {
        let source = row(json!({"a": a, "b": b}));
        let rule_value = rule(json!({
            "combinedType": "set",
            "fields": [{"field": "a"}, {"field": "b", "sensitive": true}]
        }));
        let ctx = EvalContext::default();
        prop_assert_eq!(evaluate(&source, &rule_value, &ctx), evaluate(&source, &rule_value, &ctx));
    }
}
