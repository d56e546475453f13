//! # strata-engine
//!
//! Logger nodes over the strata storage engines: append with in-order
//! sink emission, random-access history, heavy-load detection, and a
//! hierarchical cloning facility.
//!
//! Start with [`Logger`]. [`Logger::memory`] keeps everything in RAM;
//! [`Logger::tiered`] bounds memory with a ring over the newest records
//! and spills history to chunk files. [`Logger::clone_with`] derives
//! child loggers that share the parent's storage through an index
//! mapping while adding their own tags and sink.
//!
//! ```no_run
//! use strata_engine::{Logger, LogLevel, Sink};
//!
//! let logger = Logger::tiered(Some(Sink::stdout()), "./logs", "app", &["app"])?;
//! logger.enable_heavy_load_detection();
//!
//! logger.print(LogLevel::Info, "up and running");
//!
//! let worker = logger.clone_with(None, true, &["worker"]);
//! worker.print(LogLevel::Debug, "spawned");
//!
//! worker.close()?;
//! logger.close()?;
//! # Ok::<(), strata_common::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Process-wide settings and per-logger monitor options
//! - [`output`] - Sinks, colours, and the four terminal renderings
//! - [`global`] - The process-wide default logger
//! - [`shims`] - `io::Write` adapters over a logger

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod global;
mod logger;
mod monitor;
pub mod output;
pub mod shims;

pub use config::{MonitorOptions, Settings};
pub use global::{default_logger, set_default_logger};
pub use logger::Logger;
pub use output::Sink;
pub use strata_common::{Error, Result};
pub use strata_core::record::{Log, LogLevel};
