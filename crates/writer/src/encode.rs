//! Tagged value encoding.
//!
//! Every value is written as `<type-and-size header><payload>`. The
//! first header byte carries the type tag in its high three bits (tags
//! past 7 spill into an Extended second byte holding `tag - 7`) and a
//! size class in its low five bits:
//!
//! | low 5 bits | payload size                     | extension bytes |
//! |------------|----------------------------------|-----------------|
//! | 0..=28     | the bits themselves              | none            |
//! | 29         | 29 + next byte                   | 1               |
//! | 30         | 285 + next two bytes (BE)        | 2               |
//! | 31         | 65821 + next three bytes (BE)    | 3               |
//!
//! Anything larger fails with [`WriteError::SizeExceeded`].
//!
//! Pointers use their own two-bit-prefixed layout (2–5 bytes) keyed off
//! the same Pointer tag; see [`write_pointer`].

use datum::format::{
    PTR_BASE_1, PTR_BASE_2, PTR_BASE_3, SIZE_LARGE, SIZE_MAX, SIZE_MEDIUM, SIZE_SMALL,
};
use datum::{Tag, Value};

use crate::WriteError;

/// Destination of a value serialization.
///
/// The same [`serialize_value`] drives two sinks: the canonical sink
/// (hashing) writes every nested member in full, while the pooled sink
/// substitutes back-references for members it has already written.
pub(crate) trait Sink {
    fn out(&mut self) -> &mut Vec<u8>;

    /// Writes one nested member (a map key, map value, or slice element).
    fn write_child(&mut self, value: &Value) -> Result<(), WriteError>;
}

/// Emits the type-and-size header for `tag` with payload size `size`.
pub(crate) fn write_header(out: &mut Vec<u8>, tag: Tag, size: usize) -> Result<(), WriteError> {
    let (first, extended) = if (tag as u8) < 8 {
        ((tag as u8) << 5, None)
    } else {
        (0u8, Some(tag as u8 - 7))
    };

    let (size_bits, extra, extra_len) = match size {
        s if s < SIZE_SMALL => (s as u8, 0usize, 0usize),
        s if s < SIZE_MEDIUM => (29, s - SIZE_SMALL, 1),
        s if s < SIZE_LARGE => (30, s - SIZE_MEDIUM, 2),
        s if s < SIZE_MAX => (31, s - SIZE_LARGE, 3),
        s => return Err(WriteError::SizeExceeded(s)),
    };

    out.push(first | size_bits);
    if let Some(second) = extended {
        out.push(second);
    }
    for i in (0..extra_len).rev() {
        out.push(((extra >> (8 * i)) & 0xFF) as u8);
    }
    Ok(())
}

/// Emits a back-reference to data-region byte offset `p`.
///
/// Four forms, selected by offset magnitude; the second and third
/// subtract the previous form's capacity so every offset has exactly
/// one encoding:
///
/// ```text
/// p < 2^11            : 0b00100_ppp  p[7..0]
/// p < 2^11+2^19       : 0b00101_vvv  v[15..0]          v = p - 2^11
/// p < 2^11+2^19+2^27  : 0b00110_vvv  v[23..0]          v = p - (2^11+2^19)
/// otherwise           : 0b00111000   p[31..0]
/// ```
pub(crate) fn write_pointer(out: &mut Vec<u8>, p: u32) {
    if p < PTR_BASE_1 {
        out.push(0b0010_0000 | ((p >> 8) as u8 & 0b111));
        out.push(p as u8);
    } else if p < PTR_BASE_2 {
        let v = p - PTR_BASE_1;
        out.push(0b0010_1000 | ((v >> 16) as u8 & 0b111));
        out.push((v >> 8) as u8);
        out.push(v as u8);
    } else if p < PTR_BASE_3 {
        let v = p - PTR_BASE_2;
        out.push(0b0011_0000 | ((v >> 24) as u8 & 0b111));
        out.push((v >> 16) as u8);
        out.push((v >> 8) as u8);
        out.push(v as u8);
    } else {
        out.push(0b0011_1000);
        out.extend_from_slice(&p.to_be_bytes());
    }
}

/// Serializes one value: header, then payload, nested members through
/// the sink's `write_child`.
pub(crate) fn serialize_value<S: Sink + ?Sized>(
    value: &Value,
    sink: &mut S,
) -> Result<(), WriteError> {
    write_header(sink.out(), value.tag(), value.payload_size())?;

    match value {
        // Truth rides in the size field; no payload.
        Value::Bool(_) => {}
        Value::Bytes(b) => sink.out().extend_from_slice(b),
        Value::String(s) => sink.out().extend_from_slice(s.as_bytes()),
        Value::Float32(f) => sink.out().extend_from_slice(&f.to_be_bytes()),
        Value::Float64(f) => sink.out().extend_from_slice(&f.to_be_bytes()),
        Value::Int32(v) => push_be_min(sink.out(), u128::from(*v as u32), value.payload_size()),
        Value::Uint16(v) => push_be_min(sink.out(), u128::from(*v), value.payload_size()),
        Value::Uint32(v) => push_be_min(sink.out(), u128::from(*v), value.payload_size()),
        Value::Uint64(v) => push_be_min(sink.out(), u128::from(*v), value.payload_size()),
        Value::Uint128(v) => push_be_min(sink.out(), *v, value.payload_size()),
        Value::Map(m) => {
            // BTreeMap iterates key-sorted: the canonical entry order.
            for (k, v) in m {
                sink.write_child(&Value::String(k.clone()))?;
                sink.write_child(v)?;
            }
        }
        Value::Slice(items) => {
            for item in items {
                sink.write_child(item)?;
            }
        }
    }
    Ok(())
}

/// Pushes the low `len` big-endian bytes of `v`.
fn push_be_min(out: &mut Vec<u8>, v: u128, len: usize) {
    for i in (0..len).rev() {
        out.push((v >> (8 * i)) as u8);
    }
}
