//! Random-access decoding of the tagged data region.
//!
//! A [`Decoder`] is a cheap view over the data region. Every operation
//! takes a byte offset and is independent of any other: there is no
//! cursor, so a shared reader can serve many concurrent decodes.
//!
//! Pointer values are followed transparently wherever a value is
//! expected, with the chain length capped at [`MAX_POINTER_DEPTH`] so a
//! crafted self-referential pointer fails instead of looping.

use std::collections::BTreeMap;

use datum::format::{PTR_BASE_1, PTR_BASE_2, SIZE_LARGE, SIZE_MEDIUM, SIZE_SMALL};
use datum::{Tag, Value};

use crate::errors::Error;

/// Longest pointer chain a decode will follow.
pub(crate) const MAX_POINTER_DEPTH: usize = 16;

/// Deepest map/slice nesting a full materialization will enter.
const MAX_NESTING_DEPTH: usize = 512;

/// Parsed type-and-size header.
pub(crate) struct Ctrl {
    pub tag: Tag,
    /// Size field: payload byte length for scalars, entry count for
    /// containers, truth for booleans, the raw class bits for pointers.
    pub size: usize,
    /// Offset of the first payload byte.
    pub payload: usize,
}

/// Streaming visitor over one value, for callers that want to walk a
/// record without materializing it.
///
/// Containers arrive as `begin_* … end` brackets; map keys arrive as
/// plain strings before their values. Returning `true` from
/// [`should_skip`](Visitor::should_skip) skips the value at that
/// offset entirely.
pub trait Visitor {
    fn should_skip(&mut self, offset: usize) -> Result<bool, Error> {
        let _ = offset;
        Ok(false)
    }
    fn begin_map(&mut self, entries: usize) -> Result<(), Error>;
    fn begin_slice(&mut self, items: usize) -> Result<(), Error>;
    fn end(&mut self) -> Result<(), Error>;
    fn visit_string(&mut self, value: &str) -> Result<(), Error>;
    fn visit_bytes(&mut self, value: &[u8]) -> Result<(), Error>;
    fn visit_bool(&mut self, value: bool) -> Result<(), Error>;
    fn visit_f32(&mut self, value: f32) -> Result<(), Error>;
    fn visit_f64(&mut self, value: f64) -> Result<(), Error>;
    fn visit_u16(&mut self, value: u16) -> Result<(), Error>;
    fn visit_u32(&mut self, value: u32) -> Result<(), Error>;
    fn visit_i32(&mut self, value: i32) -> Result<(), Error>;
    fn visit_u64(&mut self, value: u64) -> Result<(), Error>;
    fn visit_u128(&mut self, value: u128) -> Result<(), Error>;
}

#[derive(Clone, Copy)]
pub(crate) struct Decoder<'a> {
    pub buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn byte(&self, offset: usize) -> Result<u8, Error> {
        self.buf.get(offset).copied().ok_or_else(Error::offset)
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], Error> {
        self.buf
            .get(offset..offset + len)
            .ok_or_else(Error::offset)
    }

    /// Parses the header at `offset`.
    pub fn ctrl(&self, offset: usize) -> Result<Ctrl, Error> {
        let first = self.byte(offset)?;
        let mut tag_num = u16::from(first >> 5);
        let size_bits = usize::from(first & 0x1F);
        let mut payload = offset + 1;

        if tag_num == 0 {
            // Extended: the real tag rides in a second byte, shifted
            // down by 7.
            tag_num = u16::from(self.byte(payload)?) + 7;
            payload += 1;
        }

        let tag = u8::try_from(tag_num)
            .ok()
            .and_then(Tag::from_u8)
            .ok_or_else(|| Error::decode(format!("unknown type tag {tag_num}")))?;

        if tag == Tag::Pointer {
            // Pointers reuse the size bits as their own class field.
            return Ok(Ctrl {
                tag,
                size: size_bits,
                payload,
            });
        }

        let size = match size_bits {
            s if s < SIZE_SMALL => s,
            29 => {
                let ext = self.byte(payload)?;
                payload += 1;
                SIZE_SMALL + usize::from(ext)
            }
            30 => {
                let ext = self.bytes(payload, 2)?;
                payload += 2;
                SIZE_MEDIUM + usize::from(u16::from_be_bytes([ext[0], ext[1]]))
            }
            _ => {
                let ext = self.bytes(payload, 3)?;
                payload += 3;
                SIZE_LARGE
                    + ((usize::from(ext[0]) << 16) | (usize::from(ext[1]) << 8) | usize::from(ext[2]))
            }
        };

        Ok(Ctrl { tag, size, payload })
    }

    /// Decodes a pointer given its class bits; returns the target
    /// offset and the offset just past the pointer bytes.
    pub fn pointer(&self, class_bits: usize, payload: usize) -> Result<(usize, usize), Error> {
        let class = (class_bits >> 3) & 0x3;
        let high = (class_bits & 0x7) as u32;
        let target = match class {
            0 => {
                let b = self.byte(payload)?;
                (high << 8) | u32::from(b)
            }
            1 => {
                let b = self.bytes(payload, 2)?;
                ((high << 16) | (u32::from(b[0]) << 8) | u32::from(b[1])) + PTR_BASE_1
            }
            2 => {
                let b = self.bytes(payload, 3)?;
                ((high << 24)
                    | (u32::from(b[0]) << 16)
                    | (u32::from(b[1]) << 8)
                    | u32::from(b[2]))
                    + PTR_BASE_2
            }
            _ => {
                let b = self.bytes(payload, 4)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]])
            }
        };
        Ok((target as usize, payload + class + 1))
    }

    /// Resolves `offset` through any pointer chain to a concrete value
    /// header, failing past [`MAX_POINTER_DEPTH`] hops.
    pub fn follow_pointers(&self, mut offset: usize) -> Result<usize, Error> {
        for _ in 0..MAX_POINTER_DEPTH {
            let ctrl = self.ctrl(offset)?;
            if ctrl.tag != Tag::Pointer {
                return Ok(offset);
            }
            let (target, _) = self.pointer(ctrl.size, ctrl.payload)?;
            offset = target;
        }
        Err(Error::decode("pointer chain too deep (cycle?)"))
    }

    /// Offset of the value `count` values past `offset`, without
    /// materializing anything.
    pub fn next_value_offset(&self, mut offset: usize, mut count: usize) -> Result<usize, Error> {
        while count > 0 {
            let ctrl = self.ctrl(offset)?;
            match ctrl.tag {
                Tag::Pointer => {
                    let (_, after) = self.pointer(ctrl.size, ctrl.payload)?;
                    offset = after;
                }
                Tag::Map => {
                    count += 2 * ctrl.size;
                    offset = ctrl.payload;
                }
                Tag::Slice => {
                    count += ctrl.size;
                    offset = ctrl.payload;
                }
                // Truth lives in the size field; no payload to skip.
                Tag::Bool => offset = ctrl.payload,
                _ => offset = ctrl.payload + ctrl.size,
            }
            count -= 1;
        }
        Ok(offset)
    }

    // ---- typed reads (all pointer-tolerant) ----

    pub fn read_str(&self, offset: usize) -> Result<&'a str, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        if ctrl.tag != Tag::String {
            return Err(Error::decode("value is not a string"));
        }
        std::str::from_utf8(self.bytes(ctrl.payload, ctrl.size)?)
            .map_err(|_| Error::decode("string payload is not UTF-8"))
    }

    pub fn read_bytes(&self, offset: usize) -> Result<&'a [u8], Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        if ctrl.tag != Tag::Bytes {
            return Err(Error::decode("value is not a byte blob"));
        }
        self.bytes(ctrl.payload, ctrl.size)
    }

    pub fn read_bool(&self, offset: usize) -> Result<bool, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        if ctrl.tag != Tag::Bool {
            return Err(Error::decode("value is not a boolean"));
        }
        match ctrl.size {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(Error::decode(format!("invalid boolean size {n}"))),
        }
    }

    pub fn read_f64(&self, offset: usize) -> Result<f64, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        match ctrl.tag {
            Tag::Float64 if ctrl.size == 8 => {
                let b = self.bytes(ctrl.payload, 8)?;
                Ok(f64::from_be_bytes(b.try_into().unwrap()))
            }
            Tag::Float32 if ctrl.size == 4 => {
                let b = self.bytes(ctrl.payload, 4)?;
                Ok(f64::from(f32::from_be_bytes(b.try_into().unwrap())))
            }
            Tag::Float64 | Tag::Float32 => Err(Error::decode("malformed float size")),
            _ => Err(Error::decode("value is not a float")),
        }
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        match ctrl.tag {
            Tag::Float32 if ctrl.size == 4 => {
                let b = self.bytes(ctrl.payload, 4)?;
                Ok(f32::from_be_bytes(b.try_into().unwrap()))
            }
            Tag::Float32 => Err(Error::decode("malformed float size")),
            _ => Err(Error::decode("value is not a 32-bit float")),
        }
    }

    /// Big-endian zero-extended unsigned read; accepts any unsigned
    /// integer tag whose width admits the payload.
    pub fn read_u64(&self, offset: usize) -> Result<u64, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        let max = match ctrl.tag {
            Tag::Uint16 => 2,
            Tag::Uint32 => 4,
            Tag::Uint64 => 8,
            _ => return Err(Error::decode("value is not an unsigned integer")),
        };
        if ctrl.size > max {
            return Err(Error::decode("integer payload exceeds its type width"));
        }
        Ok(be_uint(self.bytes(ctrl.payload, ctrl.size)?) as u64)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, Error> {
        u32::try_from(self.read_u64(offset)?)
            .map_err(|_| Error::decode("integer does not fit in u32"))
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, Error> {
        u16::try_from(self.read_u64(offset)?)
            .map_err(|_| Error::decode("integer does not fit in u16"))
    }

    pub fn read_u128(&self, offset: usize) -> Result<u128, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        match ctrl.tag {
            Tag::Uint128 => {
                if ctrl.size > 16 {
                    return Err(Error::decode("integer payload exceeds 128 bits"));
                }
                Ok(be_uint(self.bytes(ctrl.payload, ctrl.size)?))
            }
            Tag::Uint16 | Tag::Uint32 | Tag::Uint64 => self.read_u64(offset).map(u128::from),
            _ => Err(Error::decode("value is not an unsigned integer")),
        }
    }

    /// Signed read: an Int32 reinterprets its bit pattern; unsigned
    /// values convert when they fit.
    pub fn read_i64(&self, offset: usize) -> Result<i64, Error> {
        let ctrl = self.ctrl(self.follow_pointers(offset)?)?;
        match ctrl.tag {
            Tag::Int32 => {
                if ctrl.size > 4 {
                    return Err(Error::decode("integer payload exceeds its type width"));
                }
                let raw = be_uint(self.bytes(ctrl.payload, ctrl.size)?) as u32;
                Ok(i64::from(raw as i32))
            }
            Tag::Uint16 | Tag::Uint32 | Tag::Uint64 => {
                i64::try_from(self.read_u64(offset)?)
                    .map_err(|_| Error::decode("integer does not fit in i64"))
            }
            _ => Err(Error::decode("value is not an integer")),
        }
    }

    /// Reads a map key at `offset` (a string, possibly behind a
    /// pointer); returns the key and the offset of its value.
    pub fn read_key(&self, offset: usize) -> Result<(&'a str, usize), Error> {
        let ctrl = self.ctrl(offset)?;
        match ctrl.tag {
            Tag::Pointer => {
                let (target, after) = self.pointer(ctrl.size, ctrl.payload)?;
                Ok((self.read_str(target)?, after))
            }
            Tag::String => {
                let key = std::str::from_utf8(self.bytes(ctrl.payload, ctrl.size)?)
                    .map_err(|_| Error::decode("map key is not UTF-8"))?;
                Ok((key, ctrl.payload + ctrl.size))
            }
            _ => Err(Error::decode("map key is not a string")),
        }
    }

    // ---- structure traversal ----

    /// Walks `path` through nested maps and slices; returns the offset
    /// of the value the path lands on.
    pub fn resolve_path(&self, offset: usize, path: &[crate::PathPart]) -> Result<usize, Error> {
        let mut current = offset;
        for part in path {
            current = self.follow_pointers(current)?;
            let ctrl = self.ctrl(current)?;
            match part {
                crate::PathPart::Key(key) => {
                    if ctrl.tag != Tag::Map {
                        return Err(Error::decode("path step into a non-map value"));
                    }
                    current = self.find_map_key(&ctrl, key)?;
                }
                crate::PathPart::Index(index) => {
                    if ctrl.tag != Tag::Slice {
                        return Err(Error::decode("path step into a non-slice value"));
                    }
                    let index = usize::try_from(*index)
                        .map_err(|_| Error::decode("negative slice index"))?;
                    if index >= ctrl.size {
                        return Err(Error::decode("slice index out of range"));
                    }
                    current = self.next_value_offset(ctrl.payload, index)?;
                }
            }
        }
        Ok(current)
    }

    fn find_map_key(&self, ctrl: &Ctrl, key: &str) -> Result<usize, Error> {
        let mut current = ctrl.payload;
        for _ in 0..ctrl.size {
            let (entry_key, value_offset) = self.read_key(current)?;
            if entry_key == key {
                return Ok(value_offset);
            }
            current = self.next_value_offset(value_offset, 1)?;
        }
        Err(Error::decode(format!("key {key:?} not present in map")))
    }

    // ---- materialization ----

    /// Decodes the full value at `offset`.
    pub fn decode_value(&self, offset: usize) -> Result<Value, Error> {
        self.decode_at(offset, 0).map(|(value, _)| value)
    }

    /// Decodes the value at `offset`, also returning the offset just
    /// past it (the next value in a sequential sweep).
    pub fn decode_at(&self, offset: usize, depth: usize) -> Result<(Value, usize), Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::decode("value nesting too deep"));
        }
        let ctrl = self.ctrl(offset)?;
        let value = match ctrl.tag {
            Tag::Pointer => {
                let (target, after) = self.pointer(ctrl.size, ctrl.payload)?;
                let resolved = self.follow_pointers(target)?;
                let (value, _) = self.decode_at(resolved, depth + 1)?;
                return Ok((value, after));
            }
            Tag::Extended => return Err(Error::decode("dangling extended tag")),
            Tag::String => Value::String(self.read_str(offset)?.to_string()),
            Tag::Bytes => Value::Bytes(self.bytes(ctrl.payload, ctrl.size)?.to_vec()),
            Tag::Bool => Value::Bool(self.read_bool(offset)?),
            Tag::Float32 => Value::Float32(self.read_f32(offset)?),
            Tag::Float64 => {
                if ctrl.size != 8 {
                    return Err(Error::decode("malformed float size"));
                }
                let b = self.bytes(ctrl.payload, 8)?;
                Value::Float64(f64::from_be_bytes(b.try_into().unwrap()))
            }
            Tag::Int32 => Value::Int32(self.read_i64(offset)? as i32),
            Tag::Uint16 => Value::Uint16(self.read_u16(offset)?),
            Tag::Uint32 => Value::Uint32(self.read_u32(offset)?),
            Tag::Uint64 => {
                if ctrl.size > 8 {
                    return Err(Error::decode("integer payload exceeds its type width"));
                }
                Value::Uint64(be_uint(self.bytes(ctrl.payload, ctrl.size)?) as u64)
            }
            Tag::Uint128 => Value::Uint128(self.read_u128(offset)?),
            Tag::Map => {
                let mut entries = BTreeMap::new();
                let mut current = ctrl.payload;
                for _ in 0..ctrl.size {
                    let (key, value_offset) = self.read_key(current)?;
                    let (value, next) = self.decode_at(value_offset, depth + 1)?;
                    entries.insert(key.to_string(), value);
                    current = next;
                }
                return Ok((Value::Map(entries), current));
            }
            Tag::Slice => {
                let mut items = Vec::with_capacity(ctrl.size.min(1024));
                let mut current = ctrl.payload;
                for _ in 0..ctrl.size {
                    let (value, next) = self.decode_at(current, depth + 1)?;
                    items.push(value);
                    current = next;
                }
                return Ok((Value::Slice(items), current));
            }
        };
        // Scalars: the payload length falls out of the header.
        let end = match ctrl.tag {
            Tag::Bool => ctrl.payload,
            _ => ctrl.payload + ctrl.size,
        };
        Ok((value, end))
    }

    /// Streams the value at `offset` through `visitor`; returns the
    /// offset just past the value.
    pub fn decode_with_visitor(
        &self,
        offset: usize,
        visitor: &mut dyn Visitor,
        depth: usize,
    ) -> Result<usize, Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::decode("value nesting too deep"));
        }
        if visitor.should_skip(offset)? {
            return self.next_value_offset(offset, 1);
        }

        let ctrl = self.ctrl(offset)?;
        match ctrl.tag {
            Tag::Pointer => {
                let (target, after) = self.pointer(ctrl.size, ctrl.payload)?;
                let resolved = self.follow_pointers(target)?;
                self.decode_with_visitor(resolved, visitor, depth + 1)?;
                Ok(after)
            }
            Tag::Extended => Err(Error::decode("dangling extended tag")),
            Tag::Map => {
                visitor.begin_map(ctrl.size)?;
                let mut current = ctrl.payload;
                for _ in 0..ctrl.size {
                    let (key, value_offset) = self.read_key(current)?;
                    visitor.visit_string(key)?;
                    current = self.decode_with_visitor(value_offset, visitor, depth + 1)?;
                }
                visitor.end()?;
                Ok(current)
            }
            Tag::Slice => {
                visitor.begin_slice(ctrl.size)?;
                let mut current = ctrl.payload;
                for _ in 0..ctrl.size {
                    current = self.decode_with_visitor(current, visitor, depth + 1)?;
                }
                visitor.end()?;
                Ok(current)
            }
            Tag::String => {
                visitor.visit_string(self.read_str(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Bytes => {
                visitor.visit_bytes(self.bytes(ctrl.payload, ctrl.size)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Bool => {
                visitor.visit_bool(self.read_bool(offset)?)?;
                Ok(ctrl.payload)
            }
            Tag::Float32 => {
                visitor.visit_f32(self.read_f32(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Float64 => {
                visitor.visit_f64(self.read_f64(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Uint16 => {
                visitor.visit_u16(self.read_u16(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Uint32 => {
                visitor.visit_u32(self.read_u32(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Int32 => {
                visitor.visit_i32(self.read_i64(offset)? as i32)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Uint64 => {
                visitor.visit_u64(self.read_u64(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
            Tag::Uint128 => {
                visitor.visit_u128(self.read_u128(offset)?)?;
                Ok(ctrl.payload + ctrl.size)
            }
        }
    }
}

/// Big-endian zero-extended integer of up to 16 payload bytes.
fn be_uint(bytes: &[u8]) -> u128 {
    let mut value = 0u128;
    for &b in bytes {
        value = (value << 8) | u128::from(b);
    }
    value
}
