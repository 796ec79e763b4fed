mod open_tests;
mod query_tests;
mod round_trip_tests;

use datum::Value;
use writer::{Config, TreeWriter};

use crate::Reader;

/// Builds a database in memory and opens it.
pub(crate) fn open_with(entries: &[(u64, Value)]) -> Reader {
    Reader::open_raw(build(entries)).expect("open_raw")
}

pub(crate) fn build(entries: &[(u64, Value)]) -> Vec<u8> {
    let mut db = TreeWriter::new(Config {
        name: "test".to_string(),
        timestamp: Some(1_700_000_000),
        partitions: None,
    });
    for (key, value) in entries {
        db.insert(*key, value.clone()).expect("insert");
    }
    let mut buf = Vec::new();
    db.serialize(&mut buf).expect("serialize");
    buf
}

/// Keys yielded by a full scan, in order.
pub(crate) fn all_keys(reader: &Reader) -> Vec<u64> {
    reader
        .get_all()
        .expect("get_all")
        .map(|item| item.expect("scan item").key())
        .collect()
}
