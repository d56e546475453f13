//! Error types shared across the strata crates.
//!
//! The taxonomy mirrors how failures actually behave at runtime:
//!
//! | Variant | Severity | Typical source |
//! | ------- | -------- | -------------- |
//! | [`Config`](Error::Config) | construction-time | missing directory, frozen settings |
//! | [`Storage`](Error::Storage) | fatal | disk I/O on append or rotation |
//! | [`Decode`](Error::Decode) | local to one record | malformed persisted line |
//! | [`OutOfRange`](Error::OutOfRange) / [`InvalidRange`](Error::InvalidRange) | caller bug | bad query indices |
//! | [`Closed`](Error::Closed) | caller bug | use after `close()` |
//!
//! A [`Storage`](Error::Storage) error on the append path means the logger
//! can no longer uphold its never-drop-a-record invariant; callers should
//! treat it as unrecoverable for that logger instance.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by the strata logger.
#[derive(Error, Debug)]
pub enum Error {
    /// Construction-time configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Disk I/O failure while appending or rotating a chunk file.
    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),

    /// A persisted line failed JSON decoding. Affects that record only;
    /// queries skip it and continue.
    #[error("malformed record in chunk {chunk} at line {line}: {source}")]
    Decode {
        /// Chunk file index the line was read from.
        chunk: usize,
        /// Zero-based line number within the chunk.
        line: usize,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A single requested index is outside the stored range.
    #[error("log index {index} out of range for {len} logs")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// Number of logs currently stored.
        len: usize,
    },

    /// A requested `[start, end)` interval is malformed or out of range.
    #[error("invalid log range {start}..{end} for {len} logs")]
    InvalidRange {
        /// Inclusive start of the requested interval.
        start: usize,
        /// Exclusive end of the requested interval.
        end: usize,
        /// Number of logs currently stored.
        len: usize,
    },

    /// The logger has already been closed.
    #[error("logger is closed")]
    Closed,
}

impl Error {
    /// Builds a [`Config`](Error::Config) error from anything displayable.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
