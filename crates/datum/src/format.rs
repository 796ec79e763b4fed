//! Wire-level constants of the database file format.
//!
//! ```text
//! [ index region    : 8 * node_count bytes                 ]
//! [ separator       : 16 zero bytes                        ]
//! [ data region     : tagged values, first-write order     ]
//! [ marker          : "~IDX"                               ]
//! [ metadata region : one Map value                        ]
//! ```
//!
//! Child pointers in the index region share one 32-bit space:
//! `[0, node_count)` are inner-node ids, `node_count` means empty, and
//! anything above `node_count + 16` is a data-region byte offset
//! shifted by the separator width.

/// Marker preceding the trailing metadata block.
pub const HEADER_MARKER: &[u8; 4] = b"~IDX";

/// Width of the zero separator between the index and data regions.
pub const SEPARATOR_SIZE: usize = 16;

/// Bytes per serialized node: two big-endian 32-bit child pointers.
pub const NODE_RECORD_SIZE: usize = 8;

/// Largest payload size encodable without extension bytes.
pub const SIZE_SMALL: usize = 29;
/// Upper bound (exclusive) of the one-extension-byte size class.
pub const SIZE_MEDIUM: usize = SIZE_SMALL + 256;
/// Upper bound (exclusive) of the two-extension-byte size class.
pub const SIZE_LARGE: usize = SIZE_MEDIUM + (1 << 16);
/// Upper bound (exclusive) of any encodable payload size.
pub const SIZE_MAX: usize = SIZE_LARGE + (1 << 24);

/// First offset requiring the 3-byte pointer form.
pub const PTR_BASE_1: u32 = 1 << 11;
/// First offset requiring the 4-byte pointer form.
pub const PTR_BASE_2: u32 = PTR_BASE_1 + (1 << 19);
/// First offset requiring the 5-byte pointer form.
pub const PTR_BASE_3: u32 = PTR_BASE_2 + (1 << 27);

/// Serialized length in bytes of a pointer to data-region offset `p`.
#[must_use]
pub fn pointer_len(p: u32) -> usize {
    if p < PTR_BASE_1 {
        2
    } else if p < PTR_BASE_2 {
        3
    } else if p < PTR_BASE_3 {
        4
    } else {
        5
    }
}
