use std::io;

use thiserror::Error;

/// Errors surfaced by the read side.
///
/// Within a scan, per-record decode failures are swallowed (the record
/// is skipped) so one corrupt value cannot break the whole scan;
/// structural errors ([`Error::Walk`], [`Error::Format`] while reading
/// nodes) abort the operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte region is not a database, or its regions are
    /// inconsistent (missing marker, index overrunning the marker,
    /// offsets past the buffer end).
    #[error("invalid database format: {0}")]
    Format(String),

    /// A value at a data offset could not be decoded, or does not have
    /// the requested type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A point lookup consumed all 64 key bits without resolving to a
    /// record or an empty slot.
    #[error("malformed search tree node")]
    Walk,

    /// A malformed query: empty path, or an operator the operand type
    /// does not support.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The reader was closed.
    #[error("database is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Error {
        Error::Format(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Error {
        Error::Decode(msg.into())
    }

    /// A read past the end of the buffer.
    pub(crate) fn offset() -> Error {
        Error::Format("unexpected end of database region".to_string())
    }
}
