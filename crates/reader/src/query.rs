//! Scans and predicate queries.
//!
//! All traversal is an explicit-stack pre-order walk of the trie, which
//! visits present keys in ascending order. Scans yield lazily through
//! an [`Iterator`]; predicate queries deliver through a caller-supplied
//! sink that returns `false` to stop early.

use std::collections::HashSet;
use std::str::FromStr;

use datum::Tag;

use crate::decoder::Decoder;
use crate::errors::Error;
use crate::{resolve_pointer, NodeReader, Reader, Record};

/// One step of a query path: a map key or a slice index.
///
/// Two single-element forms are special in [`Reader::where_`]: index
/// `-1` tests every element of a top-level slice, and key `"*"` tests
/// every value of a top-level map.
#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Key(String),
    Index(i64),
}

impl From<&str> for PathPart {
    fn from(key: &str) -> PathPart {
        PathPart::Key(key.to_string())
    }
}

impl From<i64> for PathPart {
    fn from(index: i64) -> PathPart {
        PathPart::Index(index)
    }
}

/// Comparison operator of a predicate scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    /// Substring containment.
    Like,
    /// Case-insensitive substring containment.
    Ilike,
    /// Membership in an operand set.
    In,
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Op, Error> {
        Ok(match s {
            "=" => Op::Eq,
            "!=" => Op::Ne,
            "<" => Op::Lt,
            ">" => Op::Gt,
            "LIKE" => Op::Like,
            "ILIKE" => Op::Ilike,
            "IN" => Op::In,
            other => return Err(Error::Argument(format!("unknown operator {other:?}"))),
        })
    }
}

/// The value a predicate compares against; one variant per supported
/// scalar type, plus the set forms used by [`Op::In`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Str(String),
    F64(f64),
    F32(f32),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    StrSet(Vec<String>),
    IntSet(Vec<i64>),
    U64Set(Vec<u64>),
}

impl From<&str> for Operand {
    fn from(s: &str) -> Operand {
        Operand::Str(s.to_string())
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Operand {
        Operand::Int(v)
    }
}

impl From<u64> for Operand {
    fn from(v: u64) -> Operand {
        Operand::U64(v)
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Operand {
        Operand::Bool(v)
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Operand {
        Operand::F64(v)
    }
}

/// A compiled predicate: offset in, verdict out. Captures the decoder
/// and an owned copy of the operand.
type CompareFn<'a> = Box<dyn Fn(usize) -> bool + 'a>;

/// Builds the comparator for one operand/operator pairing.
///
/// Decode failures inside the comparator read as "no match", so a
/// record of the wrong shape is skipped rather than aborting the scan.
fn comparator<'a>(dc: Decoder<'a>, op: Op, operand: &Operand) -> Result<CompareFn<'a>, Error> {
    macro_rules! cmp {
        ($read:ident, $want:expr, $cmp:expr) => {{
            let want = $want;
            let test = $cmp;
            Box::new(move |off: usize| dc.$read(off).map_or(false, |v| test(v, &want)))
                as CompareFn<'a>
        }};
    }
    macro_rules! ordered {
        ($read:ident, $want:expr, $ty:ty) => {
            match op {
                Op::Eq => cmp!($read, $want, |v, w: &$ty| v == *w),
                Op::Ne => cmp!($read, $want, |v, w: &$ty| v != *w),
                Op::Lt => cmp!($read, $want, |v, w: &$ty| v < *w),
                Op::Gt => cmp!($read, $want, |v, w: &$ty| v > *w),
                _ => return unsupported(op, operand),
            }
        };
    }

    Ok(match operand {
        Operand::Str(want) => match op {
            Op::Eq => cmp!(read_str, want.clone(), |v: &str, w: &String| v == w.as_str()),
            Op::Like => cmp!(read_str, want.clone(), |v: &str, w: &String| v
                .contains(w.as_str())),
            Op::Ilike => {
                let want = want.to_lowercase();
                Box::new(move |off| {
                    dc.read_str(off)
                        .map_or(false, |v| v.to_lowercase().contains(&want))
                })
            }
            _ => return unsupported(op, operand),
        },
        Operand::F64(want) => match op {
            Op::Eq => cmp!(read_f64, *want, |v, w: &f64| v == *w),
            Op::Lt => cmp!(read_f64, *want, |v, w: &f64| v < *w),
            Op::Gt => cmp!(read_f64, *want, |v, w: &f64| v > *w),
            _ => return unsupported(op, operand),
        },
        Operand::F32(want) => match op {
            Op::Eq => cmp!(read_f32, *want, |v, w: &f32| v == *w),
            Op::Lt => cmp!(read_f32, *want, |v, w: &f32| v < *w),
            Op::Gt => cmp!(read_f32, *want, |v, w: &f32| v > *w),
            _ => return unsupported(op, operand),
        },
        Operand::Bool(want) => match op {
            Op::Eq => cmp!(read_bool, *want, |v, w: &bool| v == *w),
            _ => return unsupported(op, operand),
        },
        Operand::Bytes(want) => match op {
            Op::Eq => cmp!(read_bytes, want.clone(), |v: &[u8], w: &Vec<u8>| v
                == w.as_slice()),
            _ => return unsupported(op, operand),
        },
        Operand::Int(want) => ordered!(read_i64, *want, i64),
        Operand::U16(want) => ordered!(read_u16, *want, u16),
        Operand::U32(want) => ordered!(read_u32, *want, u32),
        Operand::U64(want) => ordered!(read_u64, *want, u64),
        Operand::U128(want) => match op {
            Op::Eq => cmp!(read_u128, *want, |v, w: &u128| v == *w),
            Op::Ne => cmp!(read_u128, *want, |v, w: &u128| v != *w),
            _ => return unsupported(op, operand),
        },
        Operand::StrSet(items) => match op {
            Op::In => {
                let set: HashSet<String> = items.iter().cloned().collect();
                Box::new(move |off| dc.read_str(off).map_or(false, |v| set.contains(v)))
            }
            _ => return unsupported(op, operand),
        },
        Operand::IntSet(items) => match op {
            Op::In => {
                let set: HashSet<i64> = items.iter().copied().collect();
                Box::new(move |off| dc.read_i64(off).map_or(false, |v| set.contains(&v)))
            }
            _ => return unsupported(op, operand),
        },
        Operand::U64Set(items) => match op {
            Op::In => {
                let set: HashSet<u64> = items.iter().copied().collect();
                Box::new(move |off| dc.read_u64(off).map_or(false, |v| set.contains(&v)))
            }
            _ => return unsupported(op, operand),
        },
    })
}

fn unsupported<'a>(op: Op, operand: &Operand) -> Result<CompareFn<'a>, Error> {
    Err(Error::Argument(format!(
        "operator {op:?} is not supported for operand {operand:?}"
    )))
}

struct Frame {
    node: u32,
    prefix: u64,
    bit: u8,
}

/// Lazy pre-order walk over a key range; yields records in ascending
/// key order.
pub struct Scan<'a> {
    nodes: NodeReader<'a>,
    dc: Decoder<'a>,
    node_count: u32,
    data_len: usize,
    start: u64,
    end: u64,
    stack: Vec<Frame>,
}

impl<'a> Iterator for Scan<'a> {
    type Item = Result<Record<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Frame { node, prefix, bit }) = self.stack.pop() {
            // The subtree under this frame covers exactly
            // [prefix, prefix | low_bits].
            let mask = high_mask(bit);
            let lo = prefix & mask;
            let hi = lo | !mask;
            if lo > self.end || hi < self.start {
                continue;
            }

            if node >= self.node_count {
                if node == self.node_count {
                    continue;
                }
                return Some(
                    resolve_pointer(self.node_count, self.data_len, node).map(|offset| Record {
                        key: lo,
                        offset,
                        dc: self.dc,
                    }),
                );
            }

            if bit >= 64 {
                // An inner node below leaf depth means the index is
                // cyclic or truncated.
                return Some(Err(Error::Walk));
            }

            let right_prefix = lo | (1u64 << (63 - bit));
            self.stack.push(Frame {
                node: self.nodes.right(node),
                prefix: right_prefix,
                bit: bit + 1,
            });
            self.stack.push(Frame {
                node: self.nodes.left(node),
                prefix: lo,
                bit: bit + 1,
            });
        }
        None
    }
}

/// High `bit` bits set.
fn high_mask(bit: u8) -> u64 {
    if bit == 0 {
        0
    } else {
        !0u64 << (64 - u32::from(bit))
    }
}

impl Reader {
    /// Scans every present key in ascending order.
    pub fn get_all(&self) -> Result<Scan<'_>, Error> {
        self.get_range(0, u64::MAX)
    }

    /// Scans keys in `[start, end]`, ascending. An inverted range is
    /// empty.
    pub fn get_range(&self, start: u64, end: u64) -> Result<Scan<'_>, Error> {
        let nodes = self.nodes()?;
        let dc = self.decoder()?;
        let stack = if start > end {
            Vec::new()
        } else {
            // Depth 64 plus one pending sibling per level.
            let mut stack = Vec::with_capacity(66);
            stack.push(Frame {
                node: 0,
                prefix: 0,
                bit: 0,
            });
            stack
        };
        Ok(Scan {
            nodes,
            dc,
            node_count: self.metadata.node_count,
            data_len: self.data_len(),
            start,
            end,
            stack,
        })
    }

    /// Predicate scan: walks every record, resolves `path` inside it,
    /// compares the value there against `operand` under `op`, and
    /// feeds matches to `sink` until it returns `false`.
    ///
    /// Records where the path does not resolve (missing key, index out
    /// of range, wrong type) are skipped silently. An empty path or an
    /// operator the operand does not support is an argument error.
    pub fn where_<'s, F>(
        &'s self,
        path: &[PathPart],
        op: Op,
        operand: &Operand,
        mut sink: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Record<'s>) -> bool,
    {
        self.buffer()?;
        if path.is_empty() {
            return Err(Error::Argument("empty query path".to_string()));
        }

        if path.len() == 1 {
            match &path[0] {
                PathPart::Index(-1) => return self.where_slice_elements(op, operand, sink),
                PathPart::Key(key) if key == "*" => {
                    return self.where_map_values(op, operand, sink)
                }
                _ => {}
            }
        }

        let dc = self.decoder()?;
        let compare = comparator(dc, op, operand)?;
        for item in self.get_all()? {
            let record = match item {
                Ok(record) => record,
                Err(Error::Walk) => return Err(Error::Walk),
                Err(_) => continue,
            };
            let Ok(value_offset) = dc.resolve_path(record.offset, path) else {
                continue;
            };
            if compare(value_offset) && !sink(record) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Predicate scan over whole record values (no path).
    pub fn where_has<'s, F>(&'s self, operand: &Operand, mut sink: F) -> Result<(), Error>
    where
        F: FnMut(Record<'s>) -> bool,
    {
        self.buffer()?;
        let compare = comparator(self.decoder()?, Op::Eq, operand)?;
        for item in self.get_all()? {
            let record = match item {
                Ok(record) => record,
                Err(Error::Walk) => return Err(Error::Walk),
                Err(_) => continue,
            };
            if compare(record.offset) && !sink(record) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// The `[-1]` form: match records whose top-level slice contains a
    /// matching element.
    fn where_slice_elements<'s, F>(
        &'s self,
        op: Op,
        operand: &Operand,
        mut sink: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Record<'s>) -> bool,
    {
        let dc = self.decoder()?;
        let compare = comparator(dc, op, operand)?;
        for item in self.get_all()? {
            let record = match item {
                Ok(record) => record,
                Err(Error::Walk) => return Err(Error::Walk),
                Err(_) => continue,
            };
            let Ok(ctrl) = dc.ctrl(record.offset) else {
                continue;
            };
            if ctrl.tag != Tag::Slice {
                continue;
            }
            let mut current = ctrl.payload;
            for _ in 0..ctrl.size {
                if compare(current) {
                    if !sink(record) {
                        return Ok(());
                    }
                    break;
                }
                match dc.next_value_offset(current, 1) {
                    Ok(next) => current = next,
                    Err(_) => break,
                }
            }
        }
        Ok(())
    }

    /// The `["*"]` form: match records whose top-level map holds a
    /// matching value under any key.
    fn where_map_values<'s, F>(
        &'s self,
        op: Op,
        operand: &Operand,
        mut sink: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Record<'s>) -> bool,
    {
        let dc = self.decoder()?;
        let compare = comparator(dc, op, operand)?;
        for item in self.get_all()? {
            let record = match item {
                Ok(record) => record,
                Err(Error::Walk) => return Err(Error::Walk),
                Err(_) => continue,
            };
            let Ok(ctrl) = dc.ctrl(record.offset) else {
                continue;
            };
            if ctrl.tag != Tag::Map {
                continue;
            }
            let mut current = ctrl.payload;
            for _ in 0..ctrl.size {
                let Ok((_, value_offset)) = dc.read_key(current) else {
                    break;
                };
                if compare(value_offset) {
                    if !sink(record) {
                        return Ok(());
                    }
                    break;
                }
                match dc.next_value_offset(value_offset, 1) {
                    Ok(next) => current = next,
                    Err(_) => break,
                }
            }
        }
        Ok(())
    }
}
