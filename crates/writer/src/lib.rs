//! # Writer — FathomDB batch builder
//!
//! Builds a read-optimized database file in one batch: insert every
//! `(u64 key, Value)` pair, then seal with [`TreeWriter::serialize`].
//! Files are *write-once, read-many* — there is no in-place update;
//! a new file replaces the old one.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ INDEX REGION (8 bytes per node)                               │
//! │                                                               │
//! │ left child (u32 BE) | right child (u32 BE)                    │
//! │                                                               │
//! │ A child pointer < node_count is an inner-node id,             │
//! │ == node_count means empty, and anything above                 │
//! │ node_count + 16 is a data-region offset.                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ SEPARATOR (16 zero bytes)                                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DATA REGION (tagged values, first-write order,                │
//! │ back-references for repeats)                                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ MARKER ("~IDX")                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ METADATA (one Map value: name, created_at, node_count,        │
//! │ data_count, partitions?)                                      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deduplication
//!
//! Every inserted value is interned by content hash (murmur3 of its
//! canonical serialization). Equal values inserted under many keys are
//! stored once; sibling trie slots holding the same entry collapse
//! into their parent; repeated nested members serialize as 2–5 byte
//! back-references.
//!
//! ## Determinism
//!
//! The same inserts with the same name and timestamp produce
//! byte-identical files: map entries serialize key-sorted and the data
//! region follows first-write order of the pre-order node walk.

mod encode;
mod hash;
mod pool;
mod tree;

use std::io::{self, BufWriter, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, WriteBytesExt};
use datum::format::{HEADER_MARKER, SEPARATOR_SIZE};
use datum::{PartitionsConfig, Value};
use thiserror::Error;

pub use hash::murmur3_32;

use pool::{DataSerializer, Pool};
use tree::{Slot, Trie};

/// Errors surfaced while building or sealing a database.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A payload exceeded the largest encodable header size class.
    #[error("payload size {0} exceeds the maximum encodable size")]
    SizeExceeded(usize),

    /// The data region outgrew the 32-bit offset space.
    #[error("data section position {0} exceeds the 32-bit offset space")]
    OffsetOverflow(u64),

    /// A node child pointer would not fit in 32 bits.
    #[error("node child pointer {0} does not fit in 32 bits")]
    NodeOverflow(u64),

    /// The pre-order walk emitted a different node count than
    /// `prepare` fixed — an internal invariant violation.
    #[error("wrote {written} nodes, prepared {prepared}")]
    NodeCountMismatch { written: u32, prepared: u32 },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Build-time configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Database name stored in the metadata.
    pub name: String,
    /// Creation epoch seconds; defaults to the current time. Fixing it
    /// makes serialization reproducible.
    pub timestamp: Option<u64>,
    /// Key-range partitioning layout, if this file is one of several.
    pub partitions: Option<PartitionsConfig>,
}

/// The batch builder: an in-memory trie over 64-bit keys plus an
/// interned value pool.
///
/// Not thread-safe; a build is a single-threaded batch operation.
pub struct TreeWriter {
    name: String,
    timestamp: u64,
    partitions: Option<PartitionsConfig>,
    trie: Trie,
    pool: Pool,
    /// Number of keys currently present.
    data_count: u32,
    prepared: bool,
}

impl TreeWriter {
    #[must_use]
    pub fn new(cfg: Config) -> Self {
        let timestamp = cfg.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        });
        TreeWriter {
            name: cfg.name,
            timestamp,
            partitions: cfg.partitions,
            trie: Trie::new(),
            pool: Pool::new(),
            data_count: 0,
            prepared: false,
        }
    }

    /// Inserts `value` at `key`, replacing any previous value there.
    pub fn insert(&mut self, key: u64, value: Value) -> Result<(), WriteError> {
        let entry = self.pool.add(value)?;
        let delta = self.trie.insert(key, Some(entry), &mut self.pool);
        self.apply_delta(delta);
        self.prepared = false;
        Ok(())
    }

    /// Inserts `value` with structurally empty members stripped first
    /// (empty strings/bytes/containers, zero numbers, `false`).
    ///
    /// A value that strips away entirely clears the key instead.
    pub fn insert_default_null(&mut self, key: u64, value: Value) -> Result<(), WriteError> {
        match value.filter_empty() {
            Some(filtered) => self.insert(key, filtered),
            None => {
                let delta = self.trie.insert(key, None, &mut self.pool);
                self.apply_delta(delta);
                self.prepared = false;
                Ok(())
            }
        }
    }

    /// Looks a key up in the in-memory tree.
    ///
    /// Returns the key prefix actually matched (keys sharing a value
    /// can resolve high up in the trie) and the value, if any.
    #[must_use]
    pub fn find(&self, key: u64) -> (u64, Option<&Value>) {
        let (prefix_bits, slot) = self.trie.find(key);
        let mask = if prefix_bits == 0 {
            0
        } else {
            !0u64 << (64 - prefix_bits)
        };
        let value = match slot {
            Slot::Data(idx) => Some(&self.pool.entry(idx).value),
            _ => None,
        };
        (key & mask, value)
    }

    /// Number of keys currently present.
    #[must_use]
    pub fn data_count(&self) -> u32 {
        self.data_count
    }

    /// Seals the database into `writer`; returns the bytes written.
    ///
    /// The builder stays intact: serializing twice produces identical
    /// bytes.
    pub fn serialize<W: Write>(&mut self, writer: W) -> Result<u64, WriteError> {
        if !self.prepared {
            self.trie.prepare();
            self.prepared = true;
        }
        let total = self.trie.total_nodes();

        let mut out = BufWriter::new(writer);
        let mut data = DataSerializer::new();

        let mut nodes_written = 0u32;
        if total > 0 {
            nodes_written = self.write_node(&mut out, 0, total, &mut data)?;
            if nodes_written != total {
                return Err(WriteError::NodeCountMismatch {
                    written: nodes_written,
                    prepared: total,
                });
            }
        }

        out.write_all(&[0u8; SEPARATOR_SIZE])?;
        out.write_all(data.bytes())?;
        out.write_all(HEADER_MARKER)?;

        let mut meta = DataSerializer::new();
        meta.serialize_root(&self.metadata_value(total))?;
        out.write_all(meta.bytes())?;
        out.flush()?;

        let written = u64::from(nodes_written) * 8
            + SEPARATOR_SIZE as u64
            + data.bytes().len() as u64
            + HEADER_MARKER.len() as u64
            + meta.bytes().len() as u64;

        tracing::debug!(
            nodes = total,
            data_bytes = data.bytes().len(),
            keys = self.data_count,
            total_bytes = written,
            "database serialized"
        );

        Ok(written)
    }

    /// Emits `node` and, pre-order, every node below it.
    fn write_node<W: Write>(
        &self,
        out: &mut BufWriter<W>,
        node_idx: u32,
        total: u32,
        data: &mut DataSerializer,
    ) -> Result<u32, WriteError> {
        let children = self.trie.node(node_idx).children;

        let left = self.child_pointer(children[0], total, data)?;
        let right = self.child_pointer(children[1], total, data)?;
        out.write_u32::<BigEndian>(left)?;
        out.write_u32::<BigEndian>(right)?;

        let mut written = 1u32;
        for child in children {
            if let Slot::Node(inner) = child {
                written += self.write_node(out, inner, total, data)?;
            }
        }
        Ok(written)
    }

    /// Resolves a child slot into the shared 32-bit pointer space,
    /// flushing data entries into the data region on first touch.
    fn child_pointer(
        &self,
        slot: Slot,
        total: u32,
        data: &mut DataSerializer,
    ) -> Result<u32, WriteError> {
        match slot {
            Slot::Empty => Ok(total),
            Slot::Node(inner) => Ok(self.trie.node(inner).id),
            Slot::Data(idx) => {
                let entry = self.pool.entry(idx);
                let pos = data.write_with_ref(entry.hash, &entry.value)?;
                let raw = u64::from(total) + SEPARATOR_SIZE as u64 + u64::from(pos);
                u32::try_from(raw).map_err(|_| WriteError::NodeOverflow(raw))
            }
        }
    }

    fn metadata_value(&self, total: u32) -> Value {
        let mut meta = std::collections::BTreeMap::new();
        meta.insert("created_at".to_string(), Value::Uint64(self.timestamp));
        meta.insert("name".to_string(), Value::String(self.name.clone()));
        meta.insert("node_count".to_string(), Value::Uint32(total));
        meta.insert("data_count".to_string(), Value::Uint32(self.data_count));
        if let Some(parts) = &self.partitions {
            meta.insert("partitions".to_string(), parts.to_value());
        }
        Value::Map(meta)
    }

    fn apply_delta(&mut self, delta: tree::KeyDelta) {
        if delta > 0 {
            self.data_count += delta as u32;
        } else {
            self.data_count = self.data_count.saturating_sub((-delta) as u32);
        }
    }
}
