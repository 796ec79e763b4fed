//! # Reader — FathomDB read side
//!
//! Opens a sealed database file and serves point lookups, range scans,
//! full scans, and predicate scans over it.
//!
//! ## Open path
//!
//! [`Reader::open`] memory-maps the file read-only; if mapping fails
//! (unsupported filesystem, platform quirks) the file is read into a
//! heap buffer instead. [`Reader::open_raw`] accepts bytes already in
//! memory. Layout recovery works backwards: find the last `~IDX`
//! marker, decode the metadata map behind it, then cut the buffer into
//! index / separator / data regions from `node_count`.
//!
//! ## Sharing
//!
//! After open the reader holds only immutable state, so one instance
//! can serve any number of concurrent read operations; no locks, no
//! cursors. Values yielded by queries borrow the underlying buffer and
//! must not outlive [`Reader::close`].

mod decoder;
mod errors;
mod query;
mod validate;

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use datum::format::{HEADER_MARKER, NODE_RECORD_SIZE, SEPARATOR_SIZE};
use datum::{PartitionsConfig, Value};
use memmap2::Mmap;

pub use decoder::Visitor;
pub use errors::Error;
pub use query::{Op, Operand, PathPart, Scan};

use decoder::Decoder;

/// The backing byte region: a read-only map or an owned buffer.
#[derive(Debug)]
enum Source {
    Mapped(Mmap),
    Heap(Vec<u8>),
}

impl Source {
    fn bytes(&self) -> &[u8] {
        match self {
            Source::Mapped(map) => map,
            Source::Heap(buf) => buf,
        }
    }
}

/// Database metadata decoded from the trailing map.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub name: String,
    /// Build time, epoch seconds.
    pub created_at: u64,
    /// Inner nodes in the index region.
    pub node_count: u32,
    /// Keys present when the file was sealed.
    pub data_count: u32,
    /// Key-range partitioning, when the file is one of several.
    pub partitions: Option<PartitionsConfig>,
}

/// A read handle over one database file.
#[derive(Debug)]
pub struct Reader {
    source: Option<Source>,
    metadata: Metadata,
    /// Byte length of the index region (`node_count * 8`).
    tree_len: usize,
    /// Data region bounds within the buffer.
    data_start: usize,
    data_end: usize,
}

impl Reader {
    /// Opens a database file, memory-mapping it when possible.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader, Error> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(Error::format("file is empty"));
        }

        // SAFETY: the map is created read-only over a file we never
        // write through; the database contract is write-once.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => Reader::from_source(Source::Mapped(map)),
            Err(err) => {
                tracing::debug!(error = %err, "memory map failed, loading into heap");
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf)?;
                Reader::from_source(Source::Heap(buf))
            }
        }
    }

    /// Opens a database from bytes already in memory.
    pub fn open_raw(buffer: Vec<u8>) -> Result<Reader, Error> {
        Reader::from_source(Source::Heap(buffer))
    }

    fn from_source(source: Source) -> Result<Reader, Error> {
        let buf = source.bytes();

        let marker = buf
            .windows(HEADER_MARKER.len())
            .rposition(|window| window == HEADER_MARKER)
            .ok_or_else(|| Error::format("metadata marker not found"))?;
        let metadata_start = marker + HEADER_MARKER.len();

        let metadata = decode_metadata(&Decoder {
            buf: &buf[metadata_start..],
        })?;

        let tree_len = metadata.node_count as usize * NODE_RECORD_SIZE;
        let data_start = tree_len + SEPARATOR_SIZE;
        if data_start > marker {
            return Err(Error::format(
                "index region inconsistent with metadata node count",
            ));
        }

        tracing::debug!(
            name = %metadata.name,
            nodes = metadata.node_count,
            keys = metadata.data_count,
            data_bytes = marker - data_start,
            "database opened"
        );

        Ok(Reader {
            source: Some(source),
            metadata,
            tree_len,
            data_start,
            data_end: marker,
        })
    }

    /// Releases the backing buffer or mapping. Idempotent; any further
    /// query returns [`Error::Closed`].
    pub fn close(&mut self) -> Result<(), Error> {
        self.source = None;
        Ok(())
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn buffer(&self) -> Result<&[u8], Error> {
        self.source
            .as_ref()
            .map(Source::bytes)
            .ok_or(Error::Closed)
    }

    pub(crate) fn decoder(&self) -> Result<Decoder<'_>, Error> {
        Ok(Decoder {
            buf: &self.buffer()?[self.data_start..self.data_end],
        })
    }

    pub(crate) fn nodes(&self) -> Result<NodeReader<'_>, Error> {
        Ok(NodeReader {
            buf: &self.buffer()?[..self.tree_len],
        })
    }

    pub(crate) fn data_len(&self) -> usize {
        self.data_end - self.data_start
    }

    /// Point lookup: walks the 64 key bits from most significant down.
    ///
    /// Returns `Ok(None)` when the key has no record. A walk that runs
    /// out of bits while still inside the index is a malformed file.
    pub fn find(&self, key: u64) -> Result<Option<Record<'_>>, Error> {
        let nodes = self.nodes()?;
        let node_count = self.metadata.node_count;

        let mut node = 0u32;
        for depth in 0..64u32 {
            if node >= node_count {
                break;
            }
            node = if (key >> (63 - depth)) & 1 == 0 {
                nodes.left(node)
            } else {
                nodes.right(node)
            };
        }

        if node == node_count {
            return Ok(None);
        }
        if node > node_count {
            let offset = resolve_pointer(node_count, self.data_len(), node)?;
            return Ok(Some(Record {
                key,
                offset,
                dc: self.decoder()?,
            }));
        }
        Err(Error::Walk)
    }

    // ---- partitioning helpers ----

    /// Checks which partition holds `id`.
    ///
    /// Returns `(in_any, in_current, label)`: whether some partition
    /// covers the id, whether it is this file's own partition, and the
    /// partition label.
    pub fn check_partition(&self, id: u64) -> Result<(bool, bool, String), Error> {
        self.buffer()?;
        let parts = self
            .metadata
            .partitions
            .as_ref()
            .filter(|p| !p.ranges.is_empty())
            .ok_or_else(|| Error::Argument("database has no partition ranges".to_string()))?;

        let ranges = &parts.ranges;
        if id < ranges[0].min {
            return Err(Error::Argument(format!("{id} is below the lowest partition range")));
        }
        if id > ranges[ranges.len() - 1].max {
            return Err(Error::Argument(format!("{id} is above the highest partition range")));
        }
        for range in ranges {
            if id >= range.min && id <= range.max {
                let label = range.part.to_string();
                return Ok((true, parts.current == range.part, label));
            }
        }
        Err(Error::Argument(format!("{id} falls between partition ranges")))
    }

    /// File names of every partition, formatted as
    /// `prefix sep part sep suffix`.
    pub fn get_all_partitions_files(
        &self,
        prefix: &str,
        sep: &str,
        suffix: &str,
    ) -> Result<Vec<String>, Error> {
        self.buffer()?;
        Ok(self
            .metadata
            .partitions
            .iter()
            .flat_map(|p| p.ranges.iter())
            .map(|range| format!("{prefix}{sep}{part}{sep}{suffix}", part = range.part))
            .collect())
    }
}

/// A found record: a key plus the offset of its value in the data
/// region. Borrows the reader's buffer.
pub struct Record<'a> {
    key: u64,
    pub(crate) offset: usize,
    pub(crate) dc: Decoder<'a>,
}

impl<'a> Record<'a> {
    /// The key this record was found under. Scans report the
    /// accumulated trie prefix, which for merged runs of equal-valued
    /// keys is the lowest key of the run.
    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Materializes the full value.
    pub fn decode(&self) -> Result<Value, Error> {
        self.dc.decode_value(self.offset)
    }

    /// Materializes the value at `path` inside this record.
    pub fn decode_path(&self, path: &[PathPart]) -> Result<Value, Error> {
        let offset = self.dc.resolve_path(self.offset, path)?;
        self.dc.decode_value(offset)
    }

    /// Streams the value through `visitor` without materializing it.
    pub fn decode_with(&self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.dc.decode_with_visitor(self.offset, visitor, 0)?;
        Ok(())
    }
}

/// Zero-copy view over the index region.
pub(crate) struct NodeReader<'a> {
    buf: &'a [u8],
}

impl NodeReader<'_> {
    pub fn left(&self, node: u32) -> u32 {
        BigEndian::read_u32(&self.buf[node as usize * NODE_RECORD_SIZE..])
    }

    pub fn right(&self, node: u32) -> u32 {
        BigEndian::read_u32(&self.buf[node as usize * NODE_RECORD_SIZE + 4..])
    }
}

/// Maps a node-region child pointer into a data-region byte offset.
pub(crate) fn resolve_pointer(
    node_count: u32,
    data_len: usize,
    pointer: u32,
) -> Result<usize, Error> {
    let base = u64::from(node_count) + SEPARATOR_SIZE as u64;
    let offset = u64::from(pointer)
        .checked_sub(base)
        .ok_or_else(|| Error::format("data pointer inside the separator space"))?;
    if offset >= data_len as u64 {
        return Err(Error::format("search tree points past the data region"));
    }
    Ok(offset as usize)
}

fn decode_metadata(dc: &Decoder<'_>) -> Result<Metadata, Error> {
    let value = dc.decode_value(0)?;
    let map = value
        .as_map()
        .ok_or_else(|| Error::format("metadata region is not a map"))?;

    let uint = |key: &str| map.get(key).and_then(Value::as_u64).unwrap_or(0);
    let node_count = u32::try_from(uint("node_count"))
        .map_err(|_| Error::format("metadata node_count exceeds 32 bits"))?;
    let data_count = u32::try_from(uint("data_count"))
        .map_err(|_| Error::format("metadata data_count exceeds 32 bits"))?;

    Ok(Metadata {
        name: map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: uint("created_at"),
        node_count,
        data_count,
        partitions: map.get("partitions").and_then(PartitionsConfig::from_value),
    })
}

#[cfg(test)]
mod tests;
