//! Content hashing for value interning and back-reference reuse.
//!
//! The hash is MurmurHash3 (x86, 32-bit variant, seed 0) over a value's
//! canonical serialization — the bytes the value would occupy with every
//! nested member written in full, no back-references. Two structurally
//! equal values always produce the same canonical bytes (maps serialize
//! key-sorted), so they always land on the same hash.
//!
//! Hash collisions are deliberately treated as equality by the pool and
//! the serializer: a collision merely makes two records share bytes.
//! Readers never hash.

use datum::Value;

use crate::encode::{serialize_value, Sink};
use crate::WriteError;

/// Murmur3 x86/32 over `data` with the given seed.
#[must_use]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;

    let mut chunks = data.chunks_exact(4);
    for block in &mut chunks {
        let mut k1 = u32::from_le_bytes(block.try_into().unwrap());
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    let mut k1 = 0u32;
    if tail.len() >= 3 {
        k1 ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        k1 ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        k1 ^= u32::from(tail[0]);
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;

    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;

    h1
}

/// Sink that writes every nested member in full.
struct CanonicalSink<'a> {
    out: &'a mut Vec<u8>,
}

impl Sink for CanonicalSink<'_> {
    fn out(&mut self) -> &mut Vec<u8> {
        self.out
    }

    fn write_child(&mut self, value: &Value) -> Result<(), WriteError> {
        serialize_value(value, self)
    }
}

/// Serializes `value` canonically into `buf` (cleared first).
pub(crate) fn canonical_bytes(value: &Value, buf: &mut Vec<u8>) -> Result<(), WriteError> {
    buf.clear();
    serialize_value(value, &mut CanonicalSink { out: buf })
}

/// The content hash of a value: murmur3 of its canonical bytes.
pub(crate) fn content_hash(value: &Value) -> Result<u32, WriteError> {
    let mut buf = Vec::with_capacity(64);
    canonical_bytes(value, &mut buf)?;
    Ok(murmur3_32(&buf, 0))
}
