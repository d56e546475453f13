//! # strata-core
//!
//! Core layer for the strata logger: the immutable log record and the two
//! storage engines behind every logger node.
//!
//! ## Modules
//!
//! - [`record`] - The [`Log`] record, severity levels, and tag matching
//! - [`storage`] - Storage engines ([`MemoryStorage`], [`TieredStorage`])
//!
//! The tiered engine is the interesting one: it keeps the newest `K`
//! records in a bounded ring, spills older records to fixed-size
//! append-only chunk files, and can defer disk writes into per-chunk
//! pending buffers when the process is under heavy ingest load.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod record;
pub mod storage;

pub use record::{Log, LogLevel};
pub use storage::{ChunkOptions, MemoryStorage, TieredStorage};
