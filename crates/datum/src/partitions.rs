//! Key-range partitioning metadata.
//!
//! A key universe split across several database files records the
//! split in each file's metadata under the `partitions` key, so any
//! one file can answer which sibling holds a given key.

use crate::{map, slice, Value};

/// One partition's inclusive key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    /// Partition label (its index among the files).
    pub part: u32,
    pub min: u64,
    pub max: u64,
}

/// The full partitioning layout plus which partition this file is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionsConfig {
    /// The partition the containing file holds.
    pub current: u32,
    /// Total number of partitions.
    pub total: u32,
    pub ranges: Vec<PartitionRange>,
}

impl PartitionsConfig {
    /// Encodes the layout as a metadata map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        map([
            ("current", Value::Uint32(self.current)),
            ("total", Value::Uint32(self.total)),
            (
                "ranges",
                slice(self.ranges.iter().map(|r| {
                    map([
                        ("part", Value::Uint32(r.part)),
                        ("min", Value::Uint64(r.min)),
                        ("max", Value::Uint64(r.max)),
                    ])
                })),
            ),
        ])
    }

    /// Decodes a layout from a metadata map value.
    ///
    /// Returns `None` when the value is not shaped like a partitions
    /// map; absent numeric fields default to zero the way absent
    /// metadata keys do elsewhere.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<PartitionsConfig> {
        let m = value.as_map()?;
        let field = |key: &str| m.get(key).and_then(Value::as_u64).unwrap_or(0);

        let mut ranges = Vec::new();
        if let Some(Value::Slice(items)) = m.get("ranges") {
            for item in items {
                let rm = item.as_map()?;
                let rfield = |key: &str| rm.get(key).and_then(Value::as_u64).unwrap_or(0);
                ranges.push(PartitionRange {
                    part: rfield("part") as u32,
                    min: rfield("min"),
                    max: rfield("max"),
                });
            }
        }

        Some(PartitionsConfig {
            current: field("current") as u32,
            total: field("total") as u32,
            ranges,
        })
    }
}
