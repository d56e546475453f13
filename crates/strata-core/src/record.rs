//! The log record: severity levels, tags, and the wire format.
//!
//! A [`Log`] is immutable once it reaches a storage engine. It carries the
//! raw message text (which may contain ANSI escapes when the producer is a
//! captured byte stream) and exposes clean, escape-stripped forms through
//! [`Log::message`] and [`Log::extra`]. The clean forms are what gets
//! persisted: one JSON object per line, newline-terminated, UTF-8.

use std::fmt;

use chrono::{DateTime, Local};
use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_common::strings::strip_ansi;

/// Severity of a [`Log`].
///
/// `StdoutCapture` and `StderrCapture` mark records produced by wrapping a
/// raw byte stream; they have no structured extra field. `Unknown` is the
/// decode sentinel for unrecognised persisted tokens and is preserved
/// as-is through reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum LogLevel {
    /// Decode sentinel for unrecognised level tokens.
    Unknown = -1,
    /// No severity: timestamp and message only.
    Blank = 0,
    /// Informational.
    Info,
    /// Debugging aid.
    Debug,
    /// Something looks wrong but the process continues.
    Warning,
    /// An operation failed.
    Error,
    /// The process cannot continue.
    Fatal,
    /// A captured standard-output byte stream.
    StdoutCapture,
    /// A captured standard-error byte stream.
    StderrCapture,
}

impl LogLevel {
    /// The lowercase token used in the wire format.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Blank => "",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::StdoutCapture => "stdout",
            Self::StderrCapture => "stderr",
            Self::Unknown => "???",
        }
    }

    /// Parses a wire token. Unrecognised tokens yield [`LogLevel::Unknown`].
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "" => Self::Blank,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "warning" => Self::Warning,
            "error" => Self::Error,
            "fatal" => Self::Fatal,
            "stdout" => Self::StdoutCapture,
            "stderr" => Self::StderrCapture,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for LogLevel {
    /// Column-padded display text used by the terminal renderings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Blank | Self::StdoutCapture | Self::StderrCapture => "",
            Self::Info => "   Info",
            Self::Debug => "  Debug",
            Self::Warning => "Warning",
            Self::Error => "  Error",
            Self::Fatal => "  Fatal",
            Self::Unknown => "  ???  ",
        };
        f.write_str(text)
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(Self::from_token(&token))
    }
}

/// An immutable structured log record.
///
/// Once a record has been handed to a storage engine it is never modified
/// and never re-ordered.
#[derive(Debug, Clone, PartialEq)]
pub struct Log {
    id: String,
    level: LogLevel,
    date: DateTime<Local>,
    message: String,
    extra: String,
    tags: Vec<String>,
}

impl Log {
    /// Creates a record with a fresh id and the current wall-clock time.
    ///
    /// For the capture levels the extra text is folded into the message,
    /// since those records represent an opaque byte stream.
    #[must_use]
    pub fn new(level: LogLevel, message: &str, extra: &str) -> Self {
        let now = Local::now();
        let (message, extra) = match level {
            LogLevel::StdoutCapture | LogLevel::StderrCapture => {
                (format!("{message} {extra}"), String::new())
            }
            _ => (message.to_string(), extra.to_string()),
        };

        Self {
            id: format!(
                "{}{:03}",
                now.timestamp_micros(),
                rand::thread_rng().gen_range(0..1000)
            ),
            level,
            date: now,
            message,
            extra,
            tags: Vec::new(),
        }
    }

    /// Unique id: microsecond timestamp plus a 3-digit random suffix.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Severity level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Wall-clock creation time.
    #[must_use]
    pub fn date(&self) -> DateTime<Local> {
        self.date
    }

    /// The message with ANSI escapes stripped and whitespace trimmed.
    #[must_use]
    pub fn message(&self) -> String {
        strip_ansi(&self.message).trim().to_string()
    }

    /// The message exactly as it was produced, escapes included.
    #[must_use]
    pub fn raw_message(&self) -> &str {
        &self.message
    }

    /// The extra text with ANSI escapes stripped and whitespace trimmed.
    #[must_use]
    pub fn extra(&self) -> String {
        strip_ansi(&self.extra).trim().to_string()
    }

    /// The extra text exactly as it was produced.
    #[must_use]
    pub fn raw_extra(&self) -> &str {
        &self.extra
    }

    /// Tags attached to this record, in first-insertion order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Attaches tags. Tags are lowercased; duplicates are ignored.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref().to_lowercase();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    /// Returns true iff the record carries every one of the given tags.
    #[must_use]
    pub fn matches(&self, tags: &[&str]) -> bool {
        tags.iter()
            .all(|t| self.tags.contains(&t.to_lowercase()))
    }

    /// Returns true iff the record carries at least one of the given tags.
    #[must_use]
    pub fn matches_any(&self, tags: &[&str]) -> bool {
        tags.iter()
            .any(|t| self.tags.contains(&t.to_lowercase()))
    }

    /// Returns true iff the record's level is one of the given levels.
    #[must_use]
    pub fn level_matches_any(&self, levels: &[LogLevel]) -> bool {
        levels.contains(&self.level)
    }
}

/// Wire form: what actually lands on disk, clean forms only.
#[derive(Serialize, Deserialize)]
struct LogWire {
    id: String,
    level: LogLevel,
    date: DateTime<Local>,
    message: String,
    extra: String,
    tags: Vec<String>,
}

impl Serialize for Log {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        LogWire {
            id: self.id.clone(),
            level: self.level,
            date: self.date,
            message: self.message(),
            extra: self.extra(),
            tags: self.tags.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Log {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = LogWire::deserialize(deserializer)?;
        if wire.id.is_empty() {
            return Err(D::Error::custom("log record with empty id"));
        }
        Ok(Self {
            id: wire.id,
            level: wire.level,
            date: wire.date,
            message: wire.message,
            extra: wire.extra,
            tags: wire.tags,
        })
    }
}

/// Filters `logs` down to the records carrying every one of `tags`.
#[must_use]
pub fn logs_matching(logs: &[Log], tags: &[&str]) -> Vec<Log> {
    logs.iter().filter(|l| l.matches(tags)).cloned().collect()
}

/// Filters `logs` down to the records carrying at least one of `tags`.
#[must_use]
pub fn logs_matching_any(logs: &[Log], tags: &[&str]) -> Vec<Log> {
    logs.iter()
        .filter(|l| l.matches_any(tags))
        .cloned()
        .collect()
}

/// Filters `logs` down to the records whose level is one of `levels`.
#[must_use]
pub fn logs_with_levels(logs: &[Log], levels: &[LogLevel]) -> Vec<Log> {
    logs.iter()
        .filter(|l| l.level_matches_any(levels))
        .cloned()
        .collect()
}

/// Serialises a slice of records to a JSON array.
///
/// # Errors
///
/// Propagates the underlying serialisation error.
pub fn logs_to_json(logs: &[Log]) -> serde_json::Result<String> {
    serde_json::to_string(logs)
}

/// Serialises a slice of records to an indented JSON array.
///
/// # Errors
///
/// Propagates the underlying serialisation error.
pub fn logs_to_json_pretty(logs: &[Log]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let log = Log::new(LogLevel::Info, "hello", "");
        // microsecond timestamp (16 digits in this era) + 3-digit suffix
        assert!(log.id().len() >= 17);
        assert!(log.id().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_capture_levels_fold_extra() {
        let log = Log::new(LogLevel::StdoutCapture, "line one", "line two");
        assert_eq!(log.message(), "line one line two");
        assert_eq!(log.extra(), "");
    }

    #[test]
    fn test_clean_forms_strip_and_trim() {
        let log = Log::new(LogLevel::Error, "  \x1b[31mboom\x1b[0m ", "\x1b[0m detail ");
        assert_eq!(log.message(), "boom");
        assert_eq!(log.extra(), "detail");
        assert!(log.raw_message().contains('\x1b'));
    }

    #[test]
    fn test_tags_lowercase_no_duplicates() {
        let mut log = Log::new(LogLevel::Info, "m", "");
        log.add_tags(["Server", "HTTP", "server"]);
        assert_eq!(log.tags(), ["server", "http"]);
    }

    #[test]
    fn test_tags_keep_insertion_order() {
        let mut log = Log::new(LogLevel::Info, "m", "");
        log.add_tags(["b"]);
        log.add_tags(["a", "b", "c"]);
        assert_eq!(log.tags(), ["b", "a", "c"]);
    }

    #[test]
    fn test_match_all_and_any() {
        let mut log = Log::new(LogLevel::Info, "m", "");
        log.add_tags(["alpha", "beta"]);

        assert!(log.matches(&["Alpha"]));
        assert!(log.matches(&["alpha", "beta"]));
        assert!(!log.matches(&["alpha", "gamma"]));

        assert!(log.matches_any(&["gamma", "BETA"]));
        assert!(!log.matches_any(&["gamma", "delta"]));
        assert!(!log.matches_any(&[]));
    }

    #[test]
    fn test_level_match() {
        let log = Log::new(LogLevel::Warning, "m", "");
        assert!(log.level_matches_any(&[LogLevel::Error, LogLevel::Warning]));
        assert!(!log.level_matches_any(&[LogLevel::Info]));
    }

    #[test]
    fn test_level_tokens_roundtrip() {
        for level in [
            LogLevel::Blank,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Fatal,
            LogLevel::StdoutCapture,
            LogLevel::StderrCapture,
        ] {
            assert_eq!(LogLevel::from_token(level.token()), level);
        }
    }

    #[test]
    fn test_unknown_level_token() {
        assert_eq!(LogLevel::from_token("verbose"), LogLevel::Unknown);
        let json = "\"verbose\"";
        let level: LogLevel = serde_json::from_str(json).unwrap();
        assert_eq!(level, LogLevel::Unknown);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut log = Log::new(LogLevel::Debug, "message", "extra");
        log.add_tags(["x", "y"]);

        let json = serde_json::to_string(&log).unwrap();
        let parsed: Log = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id(), log.id());
        assert_eq!(parsed.level(), LogLevel::Debug);
        assert_eq!(parsed.message(), "message");
        assert_eq!(parsed.extra(), "extra");
        assert_eq!(parsed.tags(), ["x", "y"]);
    }

    #[test]
    fn test_serde_persists_clean_forms() {
        let log = Log::new(LogLevel::Info, "\x1b[36mtinted\x1b[0m", "");
        let json = serde_json::to_string(&log).unwrap();
        assert!(!json.contains('\u{1b}'));
        assert!(json.contains("tinted"));
    }

    #[test]
    fn test_capture_level_wire_tokens() {
        let log = Log::new(LogLevel::StderrCapture, "oops", "");
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"level\":\"stderr\""));
    }

    #[test]
    fn test_slice_filters() {
        let mut a = Log::new(LogLevel::Info, "a", "");
        a.add_tags(["web"]);
        let mut b = Log::new(LogLevel::Error, "b", "");
        b.add_tags(["db", "web"]);
        let logs = vec![a, b];

        assert_eq!(logs_matching(&logs, &["web"]).len(), 2);
        assert_eq!(logs_matching(&logs, &["db"]).len(), 1);
        assert_eq!(logs_matching_any(&logs, &["db", "cache"]).len(), 1);
        assert_eq!(logs_with_levels(&logs, &[LogLevel::Error]).len(), 1);
    }

    #[test]
    fn test_logs_to_json_array() {
        let logs = vec![
            Log::new(LogLevel::Info, "a", ""),
            Log::new(LogLevel::Error, "b", ""),
        ];
        let json = logs_to_json(&logs).unwrap();
        let parsed: Vec<Log> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].message(), "b");

        let pretty = logs_to_json_pretty(&logs).unwrap();
        assert!(pretty.contains('\n'));
    }
}
