use anyhow::Result;
use datum::{map, PartitionRange, PartitionsConfig, Value};
use tempfile::tempdir;
use writer::{Config, TreeWriter};

use super::{build, open_with};
use crate::{Error, Reader};

/// A minimal hand-built file: optional node records, the separator,
/// data bytes, the marker, and a metadata map claiming `node_count`.
fn craft(nodes: &[u8], data: &[u8], node_count: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(nodes);
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"~IDX");
    // {"node_count": Uint32(node_count)}
    buf.push(0xE1);
    buf.push(0x4A);
    buf.extend_from_slice(b"node_count");
    let width = (4 - (node_count.leading_zeros() / 8) as usize).min(4);
    buf.push(0xC0 | width as u8);
    buf.extend_from_slice(&node_count.to_be_bytes()[4 - width..]);
    buf
}

// -------------------- Open paths --------------------

#[test]
fn open_maps_a_file_on_disk() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("db.bin");
    std::fs::write(&path, build(&[(7, Value::from("seven"))]))?;

    let mut reader = Reader::open(&path)?;
    assert_eq!(reader.metadata().name, "test");
    assert_eq!(reader.metadata().created_at, 1_700_000_000);
    assert_eq!(reader.metadata().data_count, 1);
    assert_eq!(
        reader.find(7)?.unwrap().decode()?,
        Value::from("seven")
    );

    reader.close()?;
    reader.close()?; // idempotent
    assert!(matches!(reader.find(7), Err(Error::Closed)));
    Ok(())
}

#[test]
fn open_rejects_an_empty_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"")?;
    assert!(matches!(Reader::open(&path), Err(Error::Format(_))));
    Ok(())
}

#[test]
fn open_nonexistent_file_is_an_io_error() {
    assert!(matches!(
        Reader::open("/tmp/no_such_fathom_db.bin"),
        Err(Error::Io(_))
    ));
}

#[test]
fn missing_marker_is_a_format_error() {
    let err = Reader::open_raw(vec![0u8; 64]).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn node_count_overrunning_the_marker_is_rejected() {
    // Metadata claims 4 nodes but there is no index region at all.
    let buf = craft(&[], &[], 4);
    assert!(matches!(Reader::open_raw(buf), Err(Error::Format(_))));
}

#[test]
fn metadata_that_is_not_a_map_is_rejected() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend_from_slice(b"~IDX");
    buf.extend_from_slice(&[0x41, b'x']); // a bare string
    assert!(matches!(Reader::open_raw(buf), Err(Error::Format(_))));
}

#[test]
fn cyclic_node_region_surfaces_a_walk_error() {
    // One node whose children both point back at node 0.
    let buf = craft(&[0, 0, 0, 0, 0, 0, 0, 0], &[], 1);
    let reader = Reader::open_raw(buf).unwrap();

    assert!(matches!(reader.find(123), Err(Error::Walk)));
    let result: Result<Vec<_>, _> = reader.get_all().unwrap().collect();
    assert!(matches!(result, Err(Error::Walk)));
}

#[test]
fn record_with_a_self_pointer_fails_decode_not_the_open() {
    // One node: left child -> data offset 0, right child empty. The
    // data region holds a pointer aimed at itself.
    let node_count = 1u32;
    let left = (node_count + 16).to_be_bytes();
    let right = node_count.to_be_bytes();
    let mut nodes = Vec::new();
    nodes.extend_from_slice(&left);
    nodes.extend_from_slice(&right);

    let buf = craft(&nodes, &[0x20, 0x00], node_count);
    let reader = Reader::open_raw(buf).unwrap();

    let record = reader.find(0).unwrap().expect("record resolves");
    let err = record.decode().unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

// -------------------- Metadata --------------------

#[test]
fn metadata_counts_round_trip() {
    let entries: Vec<(u64, Value)> = (0..10u64)
        .map(|k| (k, map([("id", Value::Uint64(k))])))
        .collect();
    let reader = open_with(&entries);

    assert_eq!(reader.metadata().data_count, 10);
    assert!(reader.metadata().node_count > 0);
    assert!(reader.metadata().partitions.is_none());
}

fn partitioned_reader() -> Reader {
    let mut db = TreeWriter::new(Config {
        name: "parts".to_string(),
        timestamp: Some(1_700_000_000),
        partitions: Some(PartitionsConfig {
            current: 1,
            total: 3,
            ranges: vec![
                PartitionRange { part: 0, min: 0, max: 999 },
                PartitionRange { part: 1, min: 1000, max: 1999 },
                PartitionRange { part: 2, min: 2000, max: 2999 },
            ],
        }),
    });
    db.insert(1500, Value::from("here")).unwrap();
    let mut buf = Vec::new();
    db.serialize(&mut buf).unwrap();
    Reader::open_raw(buf).unwrap()
}

#[test]
fn check_partition_locates_ranges() {
    let reader = partitioned_reader();

    // Inside this file's own partition.
    assert_eq!(
        reader.check_partition(1500).unwrap(),
        (true, true, "1".to_string())
    );
    // Covered, but by a sibling file.
    assert_eq!(
        reader.check_partition(42).unwrap(),
        (true, false, "0".to_string())
    );

    // Outside every range.
    assert!(matches!(
        reader.check_partition(5000),
        Err(Error::Argument(_))
    ));
}

#[test]
fn check_partition_without_partitions_is_an_argument_error() {
    let reader = open_with(&[(1, Value::from("v"))]);
    assert!(matches!(
        reader.check_partition(1),
        Err(Error::Argument(_))
    ));
}

#[test]
fn partition_file_names_are_formatted() {
    let reader = partitioned_reader();
    assert_eq!(
        reader
            .get_all_partitions_files("db", "-", "part.bin")
            .unwrap(),
        vec!["db-0-part.bin", "db-1-part.bin", "db-2-part.bin"]
    );
}
