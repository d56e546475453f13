//! Process-wide logger settings.
//!
//! The chunk geometry (size, filename timestamp layout, extension) is
//! shared by every tiered logger in the process: changing it once chunk
//! files exist would make the old files unaddressable. The settings are
//! therefore an initialise-once record: mutate them through [`configure`]
//! during startup, and they freeze permanently when the first tiered
//! logger is constructed.
//!
//! The heavy-load parameters double as the defaults for
//! [`MonitorOptions`], which individual loggers may override.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::RwLock;
use strata_common::{Error, Result};

/// The process-wide configuration record.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Ring capacity and lines per chunk file.
    pub chunk_size: usize,
    /// chrono layout for chunk filename timestamps.
    pub file_time_format: String,
    /// Chunk file extension.
    pub file_extension: String,
    /// Ingest threshold per scan interval before heavy load is declared.
    pub max_logs_per_scan: usize,
    /// Heavy-load sample period.
    pub scan_interval: Duration,
    /// Quiet scans required before heavy load is released.
    pub negative_scans_before_align: usize,
    /// Process-memory watermark (bytes) that forces a storage drain.
    pub max_mem_usage: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            file_time_format: "%y.%m.%d-%H.%M.%S".to_string(),
            file_extension: "data".to_string(),
            max_logs_per_scan: 200,
            scan_interval: Duration::from_millis(200),
            negative_scans_before_align: 5,
            max_mem_usage: 2_000_000_000,
        }
    }
}

static SETTINGS: OnceLock<RwLock<Settings>> = OnceLock::new();
static FROZEN: AtomicBool = AtomicBool::new(false);

fn slot() -> &'static RwLock<Settings> {
    SETTINGS.get_or_init(|| RwLock::new(Settings::default()))
}

/// Returns a copy of the current settings.
#[must_use]
pub fn settings() -> Settings {
    slot().read().clone()
}

/// Mutates the process-wide settings.
///
/// # Errors
///
/// [`Error::Config`] once the settings are frozen (a tiered logger has
/// been constructed).
pub fn configure(apply: impl FnOnce(&mut Settings)) -> Result<()> {
    let mut guard = slot().write();
    if FROZEN.load(Ordering::Acquire) {
        return Err(Error::config(
            "settings are frozen once a tiered logger exists",
        ));
    }
    apply(&mut guard);
    Ok(())
}

/// Freezes the settings. Called when the first tiered logger is built.
pub(crate) fn freeze() {
    // Takes the write lock so an in-flight configure() completes first.
    let _guard = slot().write();
    FROZEN.store(true, Ordering::Release);
}

/// Heavy-load detection parameters for a single logger.
///
/// Defaults come from the process-wide [`Settings`]; override per logger
/// with the builder methods.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Sample period of the controller.
    pub scan_interval: Duration,
    /// Appends per scan above which the logger is under heavy load.
    pub max_logs_per_scan: usize,
    /// Quiet scans required before heavy load is released.
    pub negative_scans_before_align: usize,
    /// Process-memory watermark (bytes) that forces a storage drain.
    pub max_mem_usage: u64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        let s = settings();
        Self {
            scan_interval: s.scan_interval,
            max_logs_per_scan: s.max_logs_per_scan,
            negative_scans_before_align: s.negative_scans_before_align,
            max_mem_usage: s.max_mem_usage,
        }
    }
}

impl MonitorOptions {
    /// Sets the sample period.
    #[must_use]
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Sets the per-scan ingest threshold.
    #[must_use]
    pub fn with_max_logs_per_scan(mut self, max: usize) -> Self {
        self.max_logs_per_scan = max;
        self
    }

    /// Sets the hysteresis window.
    #[must_use]
    pub fn with_negative_scans_before_align(mut self, scans: usize) -> Self {
        self.negative_scans_before_align = scans;
        self
    }

    /// Sets the memory watermark for forced drains.
    #[must_use]
    pub fn with_max_mem_usage(mut self, bytes: u64) -> Self {
        self.max_mem_usage = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.chunk_size, 1000);
        assert_eq!(s.file_time_format, "%y.%m.%d-%H.%M.%S");
        assert_eq!(s.file_extension, "data");
        assert_eq!(s.max_logs_per_scan, 200);
        assert_eq!(s.scan_interval, Duration::from_millis(200));
        assert_eq!(s.negative_scans_before_align, 5);
        assert_eq!(s.max_mem_usage, 2_000_000_000);
    }

    #[test]
    fn test_monitor_options_builder() {
        let opts = MonitorOptions::default()
            .with_scan_interval(Duration::from_millis(50))
            .with_max_logs_per_scan(10)
            .with_negative_scans_before_align(2)
            .with_max_mem_usage(1024);

        assert_eq!(opts.scan_interval, Duration::from_millis(50));
        assert_eq!(opts.max_logs_per_scan, 10);
        assert_eq!(opts.negative_scans_before_align, 2);
        assert_eq!(opts.max_mem_usage, 1024);
    }
}
