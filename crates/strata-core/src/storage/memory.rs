//! Append-only in-memory storage.

use parking_lot::RwLock;
use strata_common::{Error, Result};

use crate::record::Log;

/// A growable, append-only sequence of records guarded by a single
/// reader/writer lock.
///
/// Range reads copy out of the sequence, so callers never observe a
/// reallocation.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    v: RwLock<Vec<Log>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, returning its index.
    pub fn add_log(&self, log: Log) -> usize {
        let mut v = self.v.write();
        v.push(log);
        v.len() - 1
    }

    /// Returns the record at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `index` was never assigned.
    pub fn log_at(&self, index: usize) -> Result<Log> {
        let v = self.v.read();
        v.get(index)
            .cloned()
            .ok_or(Error::OutOfRange { index, len: v.len() })
    }

    /// Returns the records in `[start, end)`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if the interval is malformed or past the end.
    pub fn logs_in(&self, start: usize, end: usize) -> Result<Vec<Log>> {
        let v = self.v.read();
        if start > end || end > v.len() {
            return Err(Error::InvalidRange {
                start,
                end,
                len: v.len(),
            });
        }
        Ok(v[start..end].to_vec())
    }

    /// Returns the records at the given ascending indices.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] on the first index that was never assigned.
    pub fn logs_at(&self, indices: &[usize]) -> Result<Vec<Log>> {
        let v = self.v.read();
        indices
            .iter()
            .map(|&i| {
                v.get(i).cloned().ok_or(Error::OutOfRange {
                    index: i,
                    len: v.len(),
                })
            })
            .collect()
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn n_logs(&self) -> usize {
        self.v.read().len()
    }
}
