//! Whole-file consistency check.
//!
//! Walks the tree collecting every data offset it points to, verifies
//! the separator is all zero, then sweeps the data section decoding
//! value after value: every value must be pointed to exactly once and
//! the sweep must end exactly at the region boundary.

use std::collections::HashSet;

use crate::errors::Error;
use crate::Reader;

impl Reader {
    /// Validates the open database; returns the first anomaly found.
    pub fn validate(&self) -> Result<(), Error> {
        let buf = self.buffer()?;

        let separator = &buf[self.tree_len..self.tree_len + datum::format::SEPARATOR_SIZE];
        if separator.iter().any(|&b| b != 0) {
            return Err(Error::format("unexpected byte in the section separator"));
        }

        let mut pointed: HashSet<usize> = HashSet::new();
        for item in self.get_all()? {
            let record = item?;
            pointed.insert(record.offset);
        }
        let pointer_count = pointed.len();

        let dc = self.decoder()?;
        let len = self.data_len();
        let mut offset = 0usize;
        while offset < len {
            let (_, next) = dc.decode_at(offset, 0).map_err(|err| {
                Error::format(format!("undecodable value at data offset {offset}: {err}"))
            })?;
            if next <= offset {
                return Err(Error::format(format!(
                    "data sweep stalled at offset {offset}"
                )));
            }
            if !pointed.remove(&offset) {
                return Err(Error::format(format!(
                    "data at offset {offset} is not reachable from the search tree"
                )));
            }
            offset = next;
        }

        if offset != len {
            return Err(Error::format(format!(
                "trailing bytes after the last value (ended at {offset}, region is {len})"
            )));
        }
        if !pointed.is_empty() {
            return Err(Error::format(format!(
                "{} of {} tree pointers have no value in the data section",
                pointed.len(),
                pointer_count
            )));
        }

        tracing::trace!(values = pointer_count, bytes = len, "database validated");
        Ok(())
    }
}
