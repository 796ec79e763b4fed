//! # Datum — FathomDB value model
//!
//! The tagged value universe stored in a FathomDB data section, shared
//! by the writer and reader crates.
//!
//! A value is one of the variants of [`Value`]: scalars (booleans,
//! unsigned integers of several widths, a signed 32-bit integer, IEEE
//! floats, strings, byte blobs), maps from string keys to values, and
//! ordered slices of values. Maps compare order-independently and
//! serialize with their keys in ascending byte order, so two
//! structurally equal maps always produce identical bytes.
//!
//! Integer payloads are *minimal*: leading zero bytes are trimmed, and
//! the value zero occupies no payload bytes at all. [`Value::payload_size`]
//! returns the size field that the wire header carries for each variant.
//!
//! The wire-level constants of the file format (marker, separator,
//! header size classes, pointer bases) live in [`format`].

use std::collections::BTreeMap;

pub mod format;
mod partitions;

pub use partitions::{PartitionRange, PartitionsConfig};

/// Wire type tags.
///
/// Tags 0–7 fit the three high bits of the first header byte; tags
/// above 7 are written as Extended (0) followed by `tag - 7` in a
/// second byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Extended = 0,
    Pointer = 1,
    String = 2,
    Float64 = 3,
    Bytes = 4,
    Uint16 = 5,
    Uint32 = 6,
    Map = 7,
    Int32 = 8,
    Uint64 = 9,
    Uint128 = 10,
    Slice = 11,
    Bool = 12,
    Float32 = 13,
}

impl Tag {
    /// Maps a raw tag number back to a `Tag`, or `None` for values
    /// outside the defined range.
    #[must_use]
    pub fn from_u8(raw: u8) -> Option<Tag> {
        Some(match raw {
            0 => Tag::Extended,
            1 => Tag::Pointer,
            2 => Tag::String,
            3 => Tag::Float64,
            4 => Tag::Bytes,
            5 => Tag::Uint16,
            6 => Tag::Uint32,
            7 => Tag::Map,
            8 => Tag::Int32,
            9 => Tag::Uint64,
            10 => Tag::Uint128,
            11 => Tag::Slice,
            12 => Tag::Bool,
            13 => Tag::Float32,
            _ => return None,
        })
    }
}

/// A structured record value.
///
/// Equality is structural: maps compare order-independently (the
/// `BTreeMap` representation is canonical), slices compare
/// element-by-element in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    Float32(f32),
    Float64(f64),
    Int32(i32),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint128(u128),
    Map(BTreeMap<String, Value>),
    Slice(Vec<Value>),
}

impl Value {
    /// The wire tag for this variant.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Value::Bool(_) => Tag::Bool,
            Value::Bytes(_) => Tag::Bytes,
            Value::String(_) => Tag::String,
            Value::Float32(_) => Tag::Float32,
            Value::Float64(_) => Tag::Float64,
            Value::Int32(_) => Tag::Int32,
            Value::Uint16(_) => Tag::Uint16,
            Value::Uint32(_) => Tag::Uint32,
            Value::Uint64(_) => Tag::Uint64,
            Value::Uint128(_) => Tag::Uint128,
            Value::Map(_) => Tag::Map,
            Value::Slice(_) => Tag::Slice,
        }
    }

    /// The size field carried by this value's wire header.
    ///
    /// For strings and byte blobs this is the byte length; for integers
    /// the minimal big-endian byte count (zero takes zero bytes); for
    /// floats the fixed IEEE width; for maps and slices the entry
    /// count; for booleans the truth value itself (1 or 0).
    #[must_use]
    pub fn payload_size(&self) -> usize {
        match self {
            Value::Bool(b) => usize::from(*b),
            Value::Bytes(b) => b.len(),
            Value::String(s) => s.len(),
            Value::Float32(_) => 4,
            Value::Float64(_) => 8,
            Value::Int32(v) => min_be_len(u64::from(*v as u32)),
            Value::Uint16(v) => min_be_len(u64::from(*v)),
            Value::Uint32(v) => min_be_len(u64::from(*v)),
            Value::Uint64(v) => min_be_len(*v),
            Value::Uint128(v) => (128 - v.leading_zeros() as usize).div_ceil(8),
            Value::Map(m) => m.len(),
            Value::Slice(s) => s.len(),
        }
    }

    /// Returns `true` for the structurally empty forms: empty string,
    /// empty bytes, zero integers and floats, `false`, zero-bit
    /// Uint128, empty map, empty slice.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::Bytes(b) => b.is_empty(),
            Value::String(s) => s.is_empty(),
            Value::Float32(f) => *f == 0.0,
            Value::Float64(f) => *f == 0.0,
            Value::Int32(v) => *v == 0,
            Value::Uint16(v) => *v == 0,
            Value::Uint32(v) => *v == 0,
            Value::Uint64(v) => *v == 0,
            Value::Uint128(v) => *v == 0,
            Value::Map(m) => m.is_empty(),
            Value::Slice(s) => s.is_empty(),
        }
    }

    /// Strips structurally empty members, recursively.
    ///
    /// Returns `None` when the value itself is empty, or becomes empty
    /// once its members are stripped — emptying cascades upward through
    /// maps and slices.
    #[must_use]
    pub fn filter_empty(self) -> Option<Value> {
        match self {
            Value::Map(m) => {
                let mut kept = BTreeMap::new();
                for (k, v) in m {
                    if let Some(fv) = v.filter_empty() {
                        kept.insert(k, fv);
                    }
                }
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Map(kept))
                }
            }
            Value::Slice(s) => {
                let kept: Vec<Value> = s.into_iter().filter_map(Value::filter_empty).collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Slice(kept))
                }
            }
            v => {
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            }
        }
    }

    /// Widens any unsigned integer variant to `u64`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint16(v) => Some(u64::from(*v)),
            Value::Uint32(v) => Some(u64::from(*v)),
            Value::Uint64(v) => Some(*v),
            Value::Uint128(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Slice(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Uint64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

/// Minimal big-endian byte length of an unsigned integer.
fn min_be_len(v: u64) -> usize {
    (64 - v.leading_zeros() as usize).div_ceil(8)
}

/// Builds a [`Value::Map`] from key/value pairs.
///
/// ```
/// use datum::{map, Value};
///
/// let v = map([("id", Value::Uint64(7)), ("name", Value::from("x"))]);
/// assert_eq!(v.payload_size(), 2);
/// ```
pub fn map<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(entries: I) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect(),
    )
}

/// Builds a [`Value::Slice`] from an iterator of values.
pub fn slice<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::Slice(items.into_iter().collect())
}
