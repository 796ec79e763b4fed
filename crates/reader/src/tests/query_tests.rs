use datum::{map, slice, Value};

use super::open_with;
use crate::{Error, Op, Operand, PathPart};

fn path(parts: &[&str]) -> Vec<PathPart> {
    parts.iter().map(|p| PathPart::from(*p)).collect()
}

/// Runs a predicate scan and collects every matching key.
fn matches(
    reader: &crate::Reader,
    path: &[PathPart],
    op: Op,
    operand: &Operand,
) -> Vec<u64> {
    let mut keys = Vec::new();
    reader
        .where_(path, op, operand, |record| {
            keys.push(record.key());
            true
        })
        .unwrap();
    keys
}

// -------------------- Equality over a path --------------------

#[test]
fn where_string_equality_yields_keys_in_order() {
    let reader = open_with(&[
        (1, map([("id", Value::Uint64(1)), ("name", Value::from("x"))])),
        (2, map([("id", Value::Uint64(2)), ("name", Value::from("x"))])),
        (3, map([("id", Value::Uint64(3)), ("name", Value::from("y"))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["name"]), Op::Eq, &Operand::from("x")),
        vec![1, 2]
    );
}

#[test]
fn where_walks_nested_paths() {
    let entries: Vec<(u64, Value)> = [5u64, 7, 9, 11]
        .iter()
        .map(|&k| (k, map([("m", map([("n", Value::Uint64(k))]))])))
        .collect();
    let reader = open_with(&entries);

    let got = matches(
        &reader,
        &path(&["m", "n"]),
        Op::Gt,
        &Operand::Int(7),
    );
    assert_eq!(got, vec![9, 11]);
}

#[test]
fn where_sink_can_stop_early() {
    let reader = open_with(&[
        (1, map([("name", Value::from("x"))])),
        (2, map([("name", Value::from("x"))])),
    ]);

    let mut seen = Vec::new();
    reader
        .where_(
            &path(&["name"]),
            Op::Eq,
            &Operand::from("x"),
            |record| {
                seen.push(record.key());
                false
            },
        )
        .unwrap();
    assert_eq!(seen, vec![1]);
}

#[test]
fn where_skips_records_where_the_path_is_missing() {
    let reader = open_with(&[
        (1, map([("name", Value::from("x"))])),
        (2, map([("other", Value::from("x"))])),
        (3, Value::from("not a map")),
    ]);

    assert_eq!(
        matches(&reader, &path(&["name"]), Op::Eq, &Operand::from("x")),
        vec![1]
    );
}

// -------------------- Substring operators --------------------

#[test]
fn like_is_substring_containment() {
    let reader = open_with(&[
        (1, map([("value", Value::from("hello world"))])),
        (2, map([("value", Value::from("goodbye"))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["value"]), Op::Like, &Operand::from("lo wor")),
        vec![1]
    );
    assert!(matches(&reader, &path(&["value"]), Op::Like, &Operand::from("LO WOR")).is_empty());
}

#[test]
fn ilike_folds_case_on_both_sides() {
    let reader = open_with(&[
        (1, map([("value", Value::from("Hello World"))])),
        (2, map([("value", Value::from("nope"))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["value"]), Op::Ilike, &Operand::from("hELLO w")),
        vec![1]
    );
}

// -------------------- Numeric operators --------------------

#[test]
fn ordered_comparisons_over_unsigned_fields() {
    let entries: Vec<(u64, Value)> = (1..=5u64)
        .map(|k| (k, map([("n", Value::Uint32(k as u32 * 10))])))
        .collect();
    let reader = open_with(&entries);

    assert_eq!(
        matches(&reader, &path(&["n"]), Op::Lt, &Operand::U32(30)),
        vec![1, 2]
    );
    assert_eq!(
        matches(&reader, &path(&["n"]), Op::Gt, &Operand::U32(30)),
        vec![4, 5]
    );
    assert_eq!(
        matches(&reader, &path(&["n"]), Op::Ne, &Operand::U32(30)),
        vec![1, 2, 4, 5]
    );
}

#[test]
fn signed_operand_matches_unsigned_storage() {
    // Stored as minimal-width unsigned; compared through the signed
    // comparator.
    let reader = open_with(&[
        (1, map([("id", Value::Uint16(1000))])),
        (2, map([("id", Value::Uint64(1_000_000))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["id"]), Op::Eq, &Operand::Int(1_000_000)),
        vec![2]
    );
    assert_eq!(
        matches(&reader, &path(&["id"]), Op::Lt, &Operand::Int(2_000)),
        vec![1]
    );
}

#[test]
fn float_and_bool_equality() {
    let reader = open_with(&[
        (1, map([("d", Value::Float64(42.1)), ("b", Value::Bool(true))])),
        (2, map([("d", Value::Float64(0.5)), ("b", Value::Bool(false))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["d"]), Op::Eq, &Operand::F64(42.1)),
        vec![1]
    );
    assert_eq!(
        matches(&reader, &path(&["b"]), Op::Eq, &Operand::Bool(false)),
        vec![2]
    );
}

#[test]
fn uint128_equality() {
    let big = u128::from(u64::MAX) + 777_123;
    let reader = open_with(&[
        (123, map([("wide", Value::Uint128(big))])),
        (124, map([("wide", Value::Uint128(1))])),
    ]);

    assert_eq!(
        matches(&reader, &path(&["wide"]), Op::Eq, &Operand::U128(big)),
        vec![123]
    );
}

#[test]
fn bytes_equality() {
    let reader = open_with(&[
        (1, map([("blob", Value::Bytes(vec![1, 2, 3, 4]))])),
        (2, map([("blob", Value::Bytes(vec![9]))])),
    ]);

    assert_eq!(
        matches(
            &reader,
            &path(&["blob"]),
            Op::Eq,
            &Operand::Bytes(vec![1, 2, 3, 4])
        ),
        vec![1]
    );
}

// -------------------- IN sets --------------------

#[test]
fn in_matches_membership() {
    let entries: Vec<(u64, Value)> = (1..=6u64)
        .map(|k| (k, map([("val", Value::String(format!("key-{k}")))])))
        .collect();
    let reader = open_with(&entries);

    let wanted = Operand::StrSet(vec![
        "key-2".to_string(),
        "key-5".to_string(),
        "key-9".to_string(),
    ]);
    assert_eq!(matches(&reader, &path(&["val"]), Op::In, &wanted), vec![2, 5]);
}

#[test]
fn in_over_integer_sets() {
    let entries: Vec<(u64, Value)> = (1..=6u64)
        .map(|k| (k, map([("id", Value::Uint64(k * 100))])))
        .collect();
    let reader = open_with(&entries);

    assert_eq!(
        matches(
            &reader,
            &path(&["id"]),
            Op::In,
            &Operand::IntSet(vec![200, 600])
        ),
        vec![2, 6]
    );
    assert_eq!(
        matches(
            &reader,
            &path(&["id"]),
            Op::In,
            &Operand::U64Set(vec![300])
        ),
        vec![3]
    );
}

// -------------------- Special path forms --------------------

#[test]
fn minus_one_tests_every_slice_element() {
    let reader = open_with(&[
        (10, slice([Value::from("alpha"), Value::from("beta")])),
        (20, slice([Value::from("gamma")])),
        (30, map([("not", Value::from("a slice"))])),
    ]);

    let got = matches(
        &reader,
        &[PathPart::Index(-1)],
        Op::Eq,
        &Operand::from("beta"),
    );
    assert_eq!(got, vec![10]);
}

#[test]
fn star_tests_every_map_value() {
    let reader = open_with(&[
        (1, map([("a", Value::from("x")), ("b", Value::from("hit"))])),
        (2, map([("a", Value::from("miss"))])),
        (3, slice([Value::from("hit")])),
    ]);

    let got = matches(
        &reader,
        &[PathPart::from("*")],
        Op::Eq,
        &Operand::from("hit"),
    );
    assert_eq!(got, vec![1]);
}

// -------------------- where_has --------------------

#[test]
fn where_has_compares_whole_record_values() {
    let reader = open_with(&[
        (1, Value::from("needle")),
        (2, Value::from("hay")),
        (3, Value::Uint64(99)),
    ]);

    let mut keys = Vec::new();
    reader
        .where_has(&Operand::from("needle"), |record| {
            keys.push(record.key());
            true
        })
        .unwrap();
    assert_eq!(keys, vec![1]);

    keys.clear();
    reader
        .where_has(&Operand::U64(99), |record| {
            keys.push(record.key());
            true
        })
        .unwrap();
    assert_eq!(keys, vec![3]);
}

// -------------------- Argument errors --------------------

#[test]
fn empty_path_is_an_argument_error() {
    let reader = open_with(&[(1, Value::from("v"))]);
    let err = reader
        .where_(&[], Op::Eq, &Operand::from("v"), |_| true)
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}

#[test]
fn unsupported_operator_is_an_argument_error() {
    let reader = open_with(&[(1, map([("b", Value::Bool(true))]))]);
    let err = reader
        .where_(&path(&["b"]), Op::Lt, &Operand::Bool(true), |_| true)
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));

    let err = reader
        .where_(&path(&["b"]), Op::Eq, &Operand::StrSet(vec![]), |_| true)
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}

#[test]
fn operator_parsing() {
    assert_eq!("=".parse::<Op>().unwrap(), Op::Eq);
    assert_eq!("!=".parse::<Op>().unwrap(), Op::Ne);
    assert_eq!("ILIKE".parse::<Op>().unwrap(), Op::Ilike);
    assert!("~".parse::<Op>().is_err());
}
