//! Formula codec round-trip tests.
//!
//! For every registered operator and representative data,
//! `parse(write(data))` must be `is_same_data`-equal to the original,
//! and malformed input must fail with a positioned error.

mod common;

use proptest::prelude::*;
use spindle_query::calendar::{BoundSide, CalendarUnit};
use spindle_query::constraint::{
    DateDescriptor, Descriptor, EnumDescriptor, F_ACCEPT_EMPTY, F_AFTER, F_BEFORE, F_EMPTY,
    F_MATCH_ALL, F_MIN, F_MAX, F_PRESET, F_SUBSET, F_TEXT, F_UNDER, NumericDescriptor,
    TextDescriptor,
};
use spindle_query::error::QueryError;
use spindle_query::formula::{self, split_fragments};
use spindle_query::model::{ConstraintData, DateValue, FieldValue, ItemId, ItemKey};

fn refs(ids: &[&str]) -> FieldValue {
    FieldValue::Refs(ids.iter().map(|id| ItemKey::unresolved(*id)).collect())
}

fn assert_roundtrip(descriptor: &Descriptor, data: &ConstraintData) {
    let text = descriptor.formula(data);
    assert!(!text.is_empty(), "no formula written for {data:?}");
    let parsed = formula::parse(&text)
        .unwrap_or_else(|e| panic!("failed to parse '{text}': {e}"));
    assert_eq!(parsed.len(), 1, "expected one clause from '{text}'");
    assert!(
        descriptor.is_same_data(data, &parsed[0]),
        "round trip changed data:\n  formula: {text}\n  original: {data:?}\n  parsed: {:?}",
        parsed[0]
    );
}

#[test]
fn enum_roundtrip_all_ops() {
    let descriptor = Descriptor::Enum(EnumDescriptor::new("status"));

    let membership = ConstraintData::new("status").with(F_SUBSET, refs(&["open", "in progress"]));
    assert_roundtrip(&descriptor, &membership);

    let single = ConstraintData::new("status").with(F_SUBSET, refs(&["open"]));
    assert_roundtrip(&descriptor, &single);

    let all_of = ConstraintData::new("labels")
        .with(F_SUBSET, refs(&["backend", "urgent"]))
        .with(F_MATCH_ALL, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &all_of);

    let under = ConstraintData::new("component")
        .with(F_SUBSET, refs(&["ui"]))
        .with(F_UNDER, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &under);

    let unset = ConstraintData::new("assignee").with(F_EMPTY, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &unset);
}

#[test]
fn date_roundtrip_all_ops() {
    let descriptor = Descriptor::Date(DateDescriptor::new("due"));

    let after_rel = ConstraintData::new("due").with(
        F_AFTER,
        FieldValue::Date(DateValue::back(7, CalendarUnit::Day, BoundSide::After)),
    );
    assert_roundtrip(&descriptor, &after_rel);

    let after_or_unset = after_rel
        .clone()
        .with(F_ACCEPT_EMPTY, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &after_or_unset);

    let before_abs = ConstraintData::new("due").with(
        F_BEFORE,
        FieldValue::Date(
            spindle_query::constraint::date::parse_date_value("2026-04-01", BoundSide::Before)
                .unwrap(),
        ),
    );
    assert_roundtrip(&descriptor, &before_abs);

    let within = ConstraintData::new("due")
        .with(
            F_AFTER,
            FieldValue::Date(DateValue::back(1, CalendarUnit::Month, BoundSide::After)),
        )
        .with(
            F_BEFORE,
            FieldValue::Date(DateValue::Relative {
                offset: 1,
                unit: CalendarUnit::Week,
                side: BoundSide::Before,
            }),
        );
    assert_roundtrip(&descriptor, &within);

    let during = ConstraintData::new("updated")
        .with(F_PRESET, FieldValue::Text("last-week".to_string()));
    assert_roundtrip(&descriptor, &during);

    let undated = ConstraintData::new("due").with(F_EMPTY, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &undated);
}

#[test]
fn numeric_roundtrip_all_ops() {
    let descriptor = Descriptor::Numeric(NumericDescriptor::new("estimate"));

    let at_least = ConstraintData::new("estimate").with(F_MIN, FieldValue::Int(30));
    assert_roundtrip(&descriptor, &at_least);

    let at_most = ConstraintData::new("estimate").with(F_MAX, FieldValue::Int(240));
    assert_roundtrip(&descriptor, &at_most);

    let between = at_least.clone().with(F_MAX, FieldValue::Int(240));
    assert_roundtrip(&descriptor, &between);

    let negative = ConstraintData::new("delta").with(F_MIN, FieldValue::Int(-10));
    assert_roundtrip(&descriptor, &negative);

    let unvalued = ConstraintData::new("estimate").with(F_EMPTY, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &unvalued);
}

#[test]
fn text_roundtrip_all_ops() {
    let descriptor = Descriptor::Text(TextDescriptor::new("summary"));

    let has = ConstraintData::new("summary").with(
        F_TEXT,
        FieldValue::Text(r#"crash "login page" qu\"ote"#.to_string()),
    );
    assert_roundtrip(&descriptor, &has);

    let has_all = ConstraintData::new("summary")
        .with(F_TEXT, FieldValue::Text("crash login".to_string()))
        .with(F_MATCH_ALL, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &has_all);

    let blank = ConstraintData::new("summary").with(F_EMPTY, FieldValue::Flag(true));
    assert_roundtrip(&descriptor, &blank);
}

#[test]
fn tokenization_handles_quotes_and_escapes() {
    assert_eq!(
        split_fragments(r#"foo "bar baz" qu\"ote"#),
        vec!["foo", "bar baz", "qu\"ote"]
    );
}

#[test]
fn quoted_ids_survive_roundtrip() {
    let descriptor = Descriptor::Enum(EnumDescriptor::new("version"));
    let data = ConstraintData::new("version")
        .with(F_SUBSET, refs(&["2.0 (beta)", r#"odd"name"#, r"back\slash"]));
    assert_roundtrip(&descriptor, &data);
}

#[test]
fn malformed_formulas_fail_with_position() {
    // Unknown operator.
    let err = formula::parse("status near open").unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownOperator { position: 7, .. }
    ));

    // Missing operand.
    let err = formula::parse("due after").unwrap_err();
    assert!(matches!(err, QueryError::Parse { position: 9, .. }));

    // Bad operand.
    let err = formula::parse("due after someday").unwrap_err();
    assert!(matches!(err, QueryError::Parse { position: 10, .. }));

    // Wrong arity.
    let err = formula::parse("estimate between (1 2 3)").unwrap_err();
    assert!(matches!(err, QueryError::Parse { .. }));

    // Unclosed group.
    let err = formula::parse("status in (open").unwrap_err();
    assert!(matches!(err, QueryError::Parse { position: 10, .. }));

    // Errors render as positioned syntax failures.
    let err = formula::parse("status near open").unwrap_err();
    assert!(err.to_string().starts_with("Invalid syntax at position 7"));
}

#[test]
fn multiple_clauses_parse_independently() {
    let records =
        formula::parse("status in (open closed) due after -7d summary has crash").unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].refs(F_SUBSET).len(), 2);
    assert!(records[1].date(F_AFTER).is_some());
    assert_eq!(records[2].text(F_TEXT), Some("crash"));
}

// === Property tests ===

fn id_strategy() -> impl Strategy<Value = String> {
    // Printable ids including the characters quoting must defend:
    // spaces, quotes, backslashes, parentheses.
    proptest::string::string_regex(r#"[a-zA-Z0-9 ()"\\._-]{1,12}"#)
        .expect("valid regex")
        .prop_filter("fragments must survive tokenization", |s| {
            !split_fragments(s).is_empty()
        })
        .prop_map(|s| s.trim().to_string())
        .prop_filter("non-empty after trim", |s| !s.is_empty())
}

fn date_value_strategy(side: BoundSide) -> impl Strategy<Value = DateValue> {
    let relative = (-999i32..=999, 0usize..3).prop_map(move |(offset, unit)| {
        let unit = [CalendarUnit::Day, CalendarUnit::Week, CalendarUnit::Month][unit];
        DateValue::Relative { offset, unit, side }
    });
    let absolute = (0i64..=4_000_000_000).prop_map(|secs| {
        DateValue::Absolute(chrono::DateTime::from_timestamp(secs, 0).expect("in range"))
    });
    prop_oneof![relative, absolute]
}

proptest! {
    #[test]
    fn prop_enum_subset_roundtrip(ids in proptest::collection::vec(id_strategy(), 1..5)) {
        let descriptor = Descriptor::Enum(EnumDescriptor::new("field"));
        let keys: Vec<ItemKey> = ids.iter().map(ItemKey::unresolved).collect();
        let data = ConstraintData::new("field").with(F_SUBSET, FieldValue::Refs(keys));
        let parsed = formula::parse(&descriptor.formula(&data)).unwrap();
        prop_assert!(descriptor.is_same_data(&data, &parsed[0]));
    }

    #[test]
    fn prop_date_bounds_roundtrip(
        after in date_value_strategy(BoundSide::After),
        before in date_value_strategy(BoundSide::Before),
    ) {
        let descriptor = Descriptor::Date(DateDescriptor::new("due"));
        let data = ConstraintData::new("due")
            .with(F_AFTER, FieldValue::Date(after))
            .with(F_BEFORE, FieldValue::Date(before));
        let parsed = formula::parse(&descriptor.formula(&data)).unwrap();
        prop_assert!(descriptor.is_same_data(&data, &parsed[0]));
    }

    #[test]
    fn prop_numeric_roundtrip(min in any::<i64>(), max in any::<i64>()) {
        let descriptor = Descriptor::Numeric(NumericDescriptor::new("estimate"));
        let data = ConstraintData::new("estimate")
            .with(F_MIN, FieldValue::Int(min))
            .with(F_MAX, FieldValue::Int(max));
        let parsed = formula::parse(&descriptor.formula(&data)).unwrap();
        prop_assert!(descriptor.is_same_data(&data, &parsed[0]));
    }

    #[test]
    fn prop_fragment_join_split_roundtrip(
        fragments in proptest::collection::vec(id_strategy(), 1..4)
    ) {
        let joined = formula::join_fragments(fragments.iter().map(String::as_str));
        prop_assert_eq!(split_fragments(&joined), fragments);
    }
}

#[test]
fn resolved_handles_are_ephemeral_in_formulas() {
    // Writing resolved keys emits their textual ids; parsing yields
    // unresolved markers, which is_same_data treats as equal.
    let descriptor = Descriptor::Enum(EnumDescriptor::new("assignee"));
    let data = ConstraintData::new("assignee").with(
        F_SUBSET,
        FieldValue::Refs(vec![
            ItemKey::resolved("alice", ItemId(7), "Alice"),
            ItemKey::unresolved("bob"),
        ]),
    );
    let text = descriptor.formula(&data);
    assert_eq!(text, "assignee in ( alice bob )");
    let parsed = formula::parse(&text).unwrap();
    assert!(descriptor.is_same_data(&data, &parsed[0]));
    assert!(parsed[0].refs(F_SUBSET).iter().all(|k| !k.is_resolved()));
}
