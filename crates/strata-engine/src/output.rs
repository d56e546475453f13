//! Sinks and terminal rendering.
//!
//! A [`Sink`] is where a logger emits its records: standard output,
//! standard error, or any shared `io::Write`. Rendering picks one of four
//! forms (plain or coloured, with or without the extra text) based on
//! whether the sink is a terminal and whether extras are enabled, and
//! redirects Warning/Error/Fatal records from standard output to standard
//! error.
//!
//! Colour constants and the rendering logic live here, not in the record
//! model; the storage layer only ever sees clean text.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_common::strings::indent;
use strata_core::record::{Log, LogLevel};

/// Timestamp layout used by the human-readable renderings.
pub const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.2f";

/// Resets the terminal to its default colour.
pub const DEFAULT_COLOR: &str = "\x1b[0m";
/// Bright black (grey), used for timestamps.
pub const BRIGHT_BLACK_COLOR: &str = "\x1b[90m";
/// Dark red, used for errors and captured stderr.
pub const DARK_RED_COLOR: &str = "\x1b[31m";
/// Dark yellow, used for warnings.
pub const DARK_YELLOW_COLOR: &str = "\x1b[33m";
/// Dark magenta, used for debug records.
pub const DARK_MAGENTA_COLOR: &str = "\x1b[35m";
/// Bright cyan, used for info records.
pub const BRIGHT_CYAN_COLOR: &str = "\x1b[96m";
/// Bright red, used for fatal records.
pub const BRIGHT_RED_COLOR: &str = "\x1b[91m";

/// A destination for rendered records.
///
/// Cloning a sink is cheap; custom writers are shared behind a lock so
/// multiple loggers can emit to the same destination.
#[derive(Clone)]
pub enum Sink {
    /// The process standard output.
    Stdout,
    /// The process standard error.
    Stderr,
    /// Any shared writer (a file, a network stream, a test buffer).
    Writer(Arc<Mutex<Box<dyn Write + Send>>>),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Sink::Stdout"),
            Self::Stderr => f.write_str("Sink::Stderr"),
            Self::Writer(_) => f.write_str("Sink::Writer(..)"),
        }
    }
}

impl Sink {
    /// A sink on the process standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::Stdout
    }

    /// A sink on the process standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::Stderr
    }

    /// Wraps an arbitrary writer.
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Self::Writer(Arc::new(Mutex::new(Box::new(w))))
    }

    /// Whether the sink is attached to a terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Stdout => io::stdout().is_terminal(),
            Self::Stderr => io::stderr().is_terminal(),
            Self::Writer(_) => false,
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")
            }
            Self::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")
            }
            Self::Writer(w) => {
                let mut out = w.lock();
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")
            }
        }
    }
}

/// Renders `log` and writes it to `sink`.
///
/// Warning, Error and Fatal records aimed at standard output are
/// redirected to standard error. Emission failures are reported rather
/// than propagated; the record is already stored.
pub(crate) fn emit(sink: &Sink, log: &Log, extras_disabled: bool) {
    let redirect = matches!(sink, Sink::Stdout)
        && matches!(
            log.level(),
            LogLevel::Warning | LogLevel::Error | LogLevel::Fatal
        );
    let sink = if redirect { Sink::Stderr } else { sink.clone() };

    let with_extra = !log.raw_extra().is_empty() && !extras_disabled;
    let line = match (sink.is_terminal(), with_extra) {
        (false, false) => render_plain(log),
        (false, true) => render_full(log),
        (true, false) => render_colored(log),
        (true, true) => render_full_colored(log),
    };

    if let Err(e) = sink.write_line(&line) {
        tracing::warn!(error = %e, "failed to write log record to sink");
    }
}

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => BRIGHT_CYAN_COLOR,
        LogLevel::Debug => DARK_MAGENTA_COLOR,
        LogLevel::Warning => DARK_YELLOW_COLOR,
        LogLevel::Error | LogLevel::StderrCapture => DARK_RED_COLOR,
        LogLevel::Fatal => BRIGHT_RED_COLOR,
        _ => "",
    }
}

/// Plain rendering: timestamp, level, clean message.
#[must_use]
pub fn render_plain(log: &Log) -> String {
    let date = log.date().format(HUMAN_TIME_FORMAT);
    match log.level() {
        LogLevel::Blank => format!("[{date}] - {}", log.message()),
        LogLevel::StdoutCapture | LogLevel::StderrCapture => log.message(),
        level => format!("[{date}] - {level}: {}", log.message()),
    }
}

/// Coloured rendering for terminals; the raw message keeps its own
/// escapes.
#[must_use]
pub fn render_colored(log: &Log) -> String {
    let date = log.date().format(HUMAN_TIME_FORMAT);
    match log.level() {
        LogLevel::Blank => format!(
            "{BRIGHT_BLACK_COLOR}[{date}]{DEFAULT_COLOR} - {}",
            log.raw_message()
        ),
        LogLevel::StdoutCapture => log.raw_message().to_string(),
        LogLevel::StderrCapture => format!(
            "{DARK_RED_COLOR}{}{DEFAULT_COLOR}",
            log.raw_message()
        ),
        level => format!(
            "{BRIGHT_BLACK_COLOR}[{date}]{DEFAULT_COLOR} - {}{level}{DEFAULT_COLOR}: {}",
            level_color(level),
            log.raw_message()
        ),
    }
}

/// Plain rendering followed by the clean extra text, indented.
#[must_use]
pub fn render_full(log: &Log) -> String {
    if log.raw_extra().is_empty() {
        return render_plain(log);
    }
    format!("{}\n{}", render_plain(log), indent(&log.extra(), 4))
}

/// Coloured rendering followed by the raw extra text, indented.
#[must_use]
pub fn render_full_colored(log: &Log) -> String {
    if log.raw_extra().is_empty() {
        return render_colored(log);
    }
    format!(
        "{}\n{}",
        render_colored(log),
        indent(log.raw_extra(), 4)
    )
}
