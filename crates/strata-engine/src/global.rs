//! The process-wide default logger.
//!
//! Initialised lazily as a memory logger on standard output; swap it with
//! [`set_default_logger`] during startup. The free functions mirror the
//! [`Logger`] printing methods for code that doesn't want to thread a
//! handle around.

use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;
use strata_core::record::LogLevel;

use crate::logger::Logger;
use crate::output::Sink;

static DEFAULT: OnceLock<RwLock<Logger>> = OnceLock::new();

fn slot() -> &'static RwLock<Logger> {
    DEFAULT.get_or_init(|| RwLock::new(Logger::memory(Some(Sink::stdout()), &[])))
}

/// A handle to the current default logger.
#[must_use]
pub fn default_logger() -> Logger {
    slot().read().clone()
}

/// Replaces the default logger. Existing handles keep pointing at the
/// old one.
pub fn set_default_logger(logger: Logger) {
    *slot().write() = logger;
}

/// Records `message` at `level` on the default logger.
pub fn print(level: LogLevel, message: impl fmt::Display) {
    default_logger().print(level, message);
}

/// Records pre-built format arguments on the default logger.
pub fn printf(level: LogLevel, args: fmt::Arguments<'_>) {
    default_logger().printf(level, args);
}

/// Records a Debug-level message on the default logger.
pub fn debug(message: impl fmt::Display) {
    default_logger().debug(message);
}

/// Records a Fatal-level message, drains the default logger, and exits
/// the process with status 1.
pub fn fatal(message: impl fmt::Display) -> ! {
    let logger = default_logger();
    logger.print(LogLevel::Fatal, message);
    if let Err(e) = logger.close() {
        tracing::error!(error = %e, "error closing default logger");
    }
    std::process::exit(1);
}
