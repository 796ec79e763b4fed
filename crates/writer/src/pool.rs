//! Value interning and the serialization-pass byte pool.
//!
//! Two separate tables with distinct lifetimes:
//!
//! - [`Pool`] lives for the whole build. It interns every inserted
//!   value by content hash into an append-only arena; tree slots hold
//!   arena indices and a per-entry refcount tracks how many slots do.
//! - [`DataSerializer`] lives for one `serialize` pass. It owns the
//!   data-region buffer and a `hash → (offset, length)` table that
//!   drives back-reference reuse.

use std::collections::HashMap;

use datum::format::pointer_len;
use datum::Value;

use crate::encode::{serialize_value, write_pointer, Sink};
use crate::hash::content_hash;
use crate::WriteError;

/// An interned value and its bookkeeping.
pub(crate) struct PoolEntry {
    pub value: Value,
    pub hash: u32,
    pub refs: u32,
}

/// Content-addressed intern pool backing the tree's data slots.
#[derive(Default)]
pub(crate) struct Pool {
    entries: Vec<PoolEntry>,
    by_hash: HashMap<u32, usize>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value` (values colliding on hash are treated as equal)
    /// and counts one more referencing slot. Returns the arena index.
    pub fn add(&mut self, value: Value) -> Result<usize, WriteError> {
        let hash = content_hash(&value)?;
        let idx = match self.by_hash.get(&hash) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.entries.push(PoolEntry {
                    value,
                    hash,
                    refs: 0,
                });
                self.by_hash.insert(hash, idx);
                idx
            }
        };
        self.entries[idx].refs += 1;
        Ok(idx)
    }

    /// Counts one more slot referencing an existing entry.
    pub fn retain(&mut self, idx: usize) {
        self.entries[idx].refs += 1;
    }

    /// Drops one slot reference. An entry reaching zero references
    /// leaves the hash table (the arena slot itself is never reused;
    /// the whole pool is discarded after serialization).
    pub fn release(&mut self, idx: usize) {
        let entry = &mut self.entries[idx];
        entry.refs -= 1;
        if entry.refs == 0 {
            self.by_hash.remove(&entry.hash);
        }
    }

    pub fn entry(&self, idx: usize) -> &PoolEntry {
        &self.entries[idx]
    }

    #[cfg(test)]
    pub fn live_entries(&self) -> usize {
        self.by_hash.len()
    }
}

#[derive(Clone, Copy)]
struct Stored {
    pos: u32,
    len: u64,
}

/// One serialization pass over the data region.
///
/// Cleared (dropped) after every `serialize`; positions recorded here
/// are byte offsets into the buffer being built.
#[derive(Default)]
pub(crate) struct DataSerializer {
    buf: Vec<u8>,
    positions: HashMap<u32, Stored>,
}

impl DataSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn position(&self) -> Result<u32, WriteError> {
        u32::try_from(self.buf.len()).map_err(|_| WriteError::OffsetOverflow(self.buf.len() as u64))
    }

    /// Writes `value` in full, or a pointer to its earlier occurrence
    /// when that is strictly smaller than re-serializing it.
    pub fn write_or_ref(&mut self, value: &Value) -> Result<(), WriteError> {
        let hash = content_hash(value)?;

        if let Some(stored) = self.positions.get(&hash).copied() {
            if stored.len > pointer_len(stored.pos) as u64 {
                write_pointer(&mut self.buf, stored.pos);
                return Ok(());
            }
            // Cheaper to repeat the value than to point at it; the
            // cached position stays as-is.
            return serialize_value(value, self);
        }

        let pos = self.position()?;
        serialize_value(value, self)?;
        let len = self.buf.len() as u64 - u64::from(pos);
        self.positions.insert(hash, Stored { pos, len });
        Ok(())
    }

    /// Flushes an interned entry into the buffer once; subsequent calls
    /// for the same hash return the cached offset without writing.
    pub fn write_with_ref(&mut self, hash: u32, value: &Value) -> Result<u32, WriteError> {
        if let Some(stored) = self.positions.get(&hash) {
            return Ok(stored.pos);
        }

        let pos = self.position()?;
        serialize_value(value, self)?;
        let len = self.buf.len() as u64 - u64::from(pos);
        self.positions.insert(hash, Stored { pos, len });
        Ok(pos)
    }

    /// Serializes a value in place with no top-level position entry —
    /// used for the metadata map, whose members still deduplicate
    /// against each other through `write_child`.
    pub fn serialize_root(&mut self, value: &Value) -> Result<(), WriteError> {
        serialize_value(value, self)
    }
}

impl Sink for DataSerializer {
    fn out(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    fn write_child(&mut self, value: &Value) -> Result<(), WriteError> {
        self.write_or_ref(value)
    }
}
