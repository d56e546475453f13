//! `io::Write` adapters over a logger.
//!
//! These let a logger stand in wherever a byte sink is expected: handing
//! [`Logger::as_stdout`] / [`Logger::as_stderr`] to a child process
//! captures its output as records, and [`Logger::fixed_writer`] turns any
//! line-oriented producer into records of a chosen level. The logger
//! itself also implements [`io::Write`], producing Blank-level records.

use std::io;

use strata_core::record::LogLevel;

use crate::logger::Logger;

/// An [`io::Write`] that records every buffer as a log of a fixed level.
///
/// Created by [`Logger::as_stdout`], [`Logger::as_stderr`], and
/// [`Logger::fixed_writer`]. One trailing newline is trimmed from each
/// buffer; the first interior newline still splits message from extra.
pub struct LevelWriter {
    logger: Logger,
    level: LogLevel,
}

impl io::Write for LevelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.logger
            .print(self.level, text.trim_end_matches('\n'));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Logger {
    /// A writer that records buffers as captured standard output.
    #[must_use]
    pub fn as_stdout(&self) -> LevelWriter {
        self.fixed_writer(LogLevel::StdoutCapture)
    }

    /// A writer that records buffers as captured standard error.
    #[must_use]
    pub fn as_stderr(&self) -> LevelWriter {
        self.fixed_writer(LogLevel::StderrCapture)
    }

    /// A writer that records buffers at the given level.
    #[must_use]
    pub fn fixed_writer(&self, level: LogLevel) -> LevelWriter {
        LevelWriter {
            logger: self.clone(),
            level,
        }
    }
}

impl io::Write for Logger {
    /// Records the buffer as a Blank-level log.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.print(LogLevel::Blank, text.as_ref());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
