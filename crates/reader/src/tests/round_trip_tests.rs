use datum::{map, slice, Value};

use super::{all_keys, build, open_with};
use crate::Error;

// -------------------- Point lookup --------------------

#[test]
fn find_returns_inserted_values() {
    let reader = open_with(&[
        (1, Value::from("one")),
        (2, Value::from("two")),
        (300, Value::from("three hundred")),
    ]);

    let record = reader.find(2).unwrap().expect("key 2 present");
    assert_eq!(record.key(), 2);
    assert_eq!(record.decode().unwrap(), Value::from("two"));

    assert!(reader.find(4).unwrap().is_none());
    assert!(reader.find(u64::MAX).unwrap().is_none());
}

#[test]
fn structured_values_round_trip() {
    let value = map([
        ("id", Value::Uint64(777)),
        ("flag", Value::Bool(true)),
        ("ratio", Value::Float64(42.1)),
        ("short", Value::Float32(23.335)),
        ("signed", Value::Int32(-12)),
        ("tiny", Value::Uint16(16)),
        ("mid", Value::Uint32(1 << 20)),
        ("wide", Value::Uint128(u128::from(u64::MAX) + 777_123)),
        ("blob", Value::Bytes(vec![1, 2, 3, 4])),
        (
            "items",
            slice([Value::from("alpha"), Value::from("beta")]),
        ),
        ("nested", map([("inner", Value::from("v"))])),
    ]);

    let reader = open_with(&[(777, value.clone())]);
    let record = reader.find(777).unwrap().expect("record");
    assert_eq!(record.decode().unwrap(), value);
}

#[test]
fn shared_value_is_stored_once_and_found_under_both_keys() {
    // Keys 1 and 2 share "a"; the data region holds its bytes once.
    let buf = build(&[
        (1, Value::from("a")),
        (2, Value::from("a")),
        (3, Value::from("b")),
    ]);
    let marker = buf
        .windows(4)
        .rposition(|w| w == b"~IDX")
        .expect("marker");
    let body = &buf[..marker];
    let needle: &[u8] = &[0x41, b'a'];
    let hits = body.windows(2).filter(|w| *w == needle).count();
    assert_eq!(hits, 1);

    let reader = crate::Reader::open_raw(buf).unwrap();
    assert_eq!(
        reader.find(2).unwrap().unwrap().decode().unwrap(),
        Value::from("a")
    );
    assert_eq!(
        reader.find(3).unwrap().unwrap().decode().unwrap(),
        Value::from("b")
    );
}

#[test]
fn bool_payloads_at_extreme_keys() {
    let reader = open_with(&[
        (u64::MAX, Value::Bool(true)),
        (0, Value::Bool(false)),
    ]);

    assert_eq!(
        reader.find(0).unwrap().unwrap().decode().unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        reader.find(u64::MAX).unwrap().unwrap().decode().unwrap(),
        Value::Bool(true)
    );
}

// -------------------- Empty database --------------------

#[test]
fn empty_database_opens_scans_and_validates() {
    let reader = open_with(&[]);

    assert_eq!(reader.metadata().node_count, 0);
    assert_eq!(reader.metadata().data_count, 0);
    assert!(all_keys(&reader).is_empty());
    assert!(reader.find(0).unwrap().is_none());
    reader.validate().unwrap();
}

// -------------------- Scan order and ranges --------------------

#[test]
fn get_all_yields_ascending_keys() {
    let keys = [9000u64, 3, 77, 1, u64::MAX, 500, 42, 1 << 40];
    let entries: Vec<(u64, Value)> = keys
        .iter()
        .map(|&k| (k, map([("id", Value::Uint64(k))])))
        .collect();
    let reader = open_with(&entries);

    let mut expected: Vec<u64> = keys.to_vec();
    expected.sort_unstable();
    assert_eq!(all_keys(&reader), expected);
}

#[test]
fn get_range_is_inclusive_and_exact() {
    let entries: Vec<(u64, Value)> = (0..50u64)
        .map(|k| (k * 10, map([("id", Value::Uint64(k * 10))])))
        .collect();
    let reader = open_with(&entries);

    let got: Vec<u64> = reader
        .get_range(100, 200)
        .unwrap()
        .map(|item| item.unwrap().key())
        .collect();
    assert_eq!(got, vec![100, 110, 120, 130, 140, 150, 160, 170, 180, 190, 200]);
}

#[test]
fn inverted_range_is_empty() {
    let reader = open_with(&[(5, Value::from("v"))]);
    assert_eq!(reader.get_range(10, 1).unwrap().count(), 0);
}

#[test]
fn range_spanning_everything_equals_get_all() {
    let entries: Vec<(u64, Value)> = [1u64, 2, 3, 1 << 63, u64::MAX]
        .iter()
        .map(|&k| (k, map([("id", Value::Uint64(k))])))
        .collect();
    let reader = open_with(&entries);

    let all: Vec<u64> = all_keys(&reader);
    let ranged: Vec<u64> = reader
        .get_range(0, u64::MAX)
        .unwrap()
        .map(|item| item.unwrap().key())
        .collect();
    assert_eq!(all, ranged);
}

#[test]
fn merged_keys_scan_as_their_prefix() {
    // Sibling keys 2 and 3 share a value, so they collapse into the
    // slot covering both; the scan reports the run's lowest key.
    let reader = open_with(&[(2, Value::from("same")), (3, Value::from("same"))]);
    assert_eq!(all_keys(&reader), vec![2]);

    // Point lookups still resolve both keys.
    assert!(reader.find(2).unwrap().is_some());
    assert!(reader.find(3).unwrap().is_some());
}

// -------------------- decode_path --------------------

#[test]
fn decode_path_reaches_nested_values() {
    let reader = open_with(&[(
        1,
        map([
            ("meta", map([("tags", slice([Value::from("x"), Value::from("y")]))])),
        ]),
    )]);

    let record = reader.find(1).unwrap().unwrap();
    let tag = record
        .decode_path(&["meta".into(), "tags".into(), 1i64.into()])
        .unwrap();
    assert_eq!(tag, Value::from("y"));

    let err = record.decode_path(&["meta".into(), "missing".into()]).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

// -------------------- Visitor --------------------

#[derive(Default)]
struct Events(Vec<String>);

impl crate::Visitor for Events {
    fn begin_map(&mut self, entries: usize) -> Result<(), Error> {
        self.0.push(format!("map({entries})"));
        Ok(())
    }
    fn begin_slice(&mut self, items: usize) -> Result<(), Error> {
        self.0.push(format!("slice({items})"));
        Ok(())
    }
    fn end(&mut self) -> Result<(), Error> {
        self.0.push("end".to_string());
        Ok(())
    }
    fn visit_string(&mut self, value: &str) -> Result<(), Error> {
        self.0.push(format!("str:{value}"));
        Ok(())
    }
    fn visit_bytes(&mut self, _: &[u8]) -> Result<(), Error> {
        self.0.push("bytes".to_string());
        Ok(())
    }
    fn visit_bool(&mut self, value: bool) -> Result<(), Error> {
        self.0.push(format!("bool:{value}"));
        Ok(())
    }
    fn visit_f32(&mut self, _: f32) -> Result<(), Error> {
        self.0.push("f32".to_string());
        Ok(())
    }
    fn visit_f64(&mut self, _: f64) -> Result<(), Error> {
        self.0.push("f64".to_string());
        Ok(())
    }
    fn visit_u16(&mut self, value: u16) -> Result<(), Error> {
        self.0.push(format!("u16:{value}"));
        Ok(())
    }
    fn visit_u32(&mut self, _: u32) -> Result<(), Error> {
        self.0.push("u32".to_string());
        Ok(())
    }
    fn visit_i32(&mut self, _: i32) -> Result<(), Error> {
        self.0.push("i32".to_string());
        Ok(())
    }
    fn visit_u64(&mut self, value: u64) -> Result<(), Error> {
        self.0.push(format!("u64:{value}"));
        Ok(())
    }
    fn visit_u128(&mut self, _: u128) -> Result<(), Error> {
        self.0.push("u128".to_string());
        Ok(())
    }
}

#[test]
fn visitor_streams_structure_without_materializing() {
    let reader = open_with(&[(
        1,
        map([
            ("id", Value::Uint64(1)),
            ("tags", slice([Value::from("a"), Value::Bool(true)])),
        ]),
    )]);

    let record = reader.find(1).unwrap().unwrap();
    let mut events = Events::default();
    record.decode_with(&mut events).unwrap();

    assert_eq!(
        events.0,
        vec![
            "map(2)",
            "str:id",
            "u64:1",
            "str:tags",
            "slice(2)",
            "str:a",
            "bool:true",
            "end",
            "end",
        ]
    );
}
