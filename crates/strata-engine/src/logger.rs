//! Logger nodes: append, random-access reads, cloning, and lifecycle.
//!
//! A [`Logger`] is a cheap handle (clone it freely across threads) over a
//! node that owns one of three backends:
//!
//! - **Memory**: an unbounded in-RAM sequence;
//! - **Tiered**: a bounded ring plus chunked append-only files;
//! - **Clone**: an index mapping into a parent logger.
//!
//! Every append assigns a dense index; sink emission is strictly in
//! ascending index order per node. When the node is quiescent a record is
//! emitted synchronously right after it is stored; under heavy load
//! emission is deferred and the alignment pass catches the sink up in
//! batches.
//!
//! Lock discipline per node: storage locks are never held across sink
//! I/O, and the sink-emission lock (which also guards the emission
//! watermark) is always taken after storage locks.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use strata_common::{Error, Result};
use strata_core::record::{Log, LogLevel};
use strata_core::storage::{ChunkOptions, MemoryStorage, TieredStorage};

use crate::config::{self, MonitorOptions};
use crate::monitor;
use crate::output::{self, Sink};

/// A structured logger with random-access history.
///
/// Cloning the handle shares the node; use [`clone_with`](Self::clone_with)
/// to derive a child logger instead.
///
/// # Examples
///
/// ```
/// use strata_engine::{Logger, LogLevel};
///
/// let logger = Logger::memory(None, &["server"]);
/// logger.add_log(LogLevel::Info, "listening", "", true)?;
///
/// assert_eq!(logger.n_logs(), 1);
/// assert_eq!(logger.log_at(0)?.message(), "listening");
/// assert!(logger.log_at(0)?.matches(&["server"]));
/// # Ok::<(), strata_common::Error>(())
/// ```
#[derive(Clone)]
pub struct Logger {
    node: Arc<Node>,
}

pub(crate) struct Node {
    pub(crate) sink: Option<Sink>,
    pub(crate) tags: Vec<String>,
    pub(crate) backend: Backend,
    /// Sink-emission lock; also guards the emission watermark.
    writer: Mutex<WriterState>,
    /// Serialises alignment passes; at most one at a time.
    align_lock: Mutex<()>,
    /// Appends observed since the last controller tick.
    pub(crate) counter: AtomicUsize,
    /// Gates synchronous emission; the tiered backend carries its own
    /// flag for direct persistence, updated together with this one.
    pub(crate) heavy_load: AtomicBool,
    extras_disabled: AtomicBool,
    open: AtomicBool,
    monitor: Mutex<MonitorSlot>,
}

struct WriterState {
    /// Count of records already emitted to the sink (or accounted as
    /// emitted when emission was suppressed).
    written: usize,
}

pub(crate) enum Backend {
    Memory(MemoryStorage),
    Tiered(TieredStorage),
    Clone(CloneNode),
}

pub(crate) struct CloneNode {
    parent: Logger,
    parent_out: bool,
    /// `v[i]` is the parent index of this node's `i`-th record.
    v: RwLock<Vec<usize>>,
}

#[derive(Default)]
struct MonitorSlot {
    started: bool,
    shutdown: Option<mpsc::Sender<mpsc::Sender<()>>>,
    handle: Option<JoinHandle<()>>,
}

impl Logger {
    /// Creates a logger that keeps every record in memory.
    ///
    /// `tags` are attached to every record created through this logger.
    #[must_use]
    pub fn memory(sink: Option<Sink>, tags: &[&str]) -> Self {
        Self::from_backend(sink, tags, Backend::Memory(MemoryStorage::new()))
    }

    /// Creates a logger that keeps the newest records in memory and
    /// persists everything to chunk files under `dir`.
    ///
    /// Chunk geometry comes from the process-wide settings, which freeze
    /// when the first tiered logger is built.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `dir` is missing, not a directory, or the
    /// initial chunk file cannot be created.
    pub fn tiered(
        sink: Option<Sink>,
        dir: impl AsRef<Path>,
        prefix: &str,
        tags: &[&str],
    ) -> Result<Self> {
        let s = config::settings();
        let opts = ChunkOptions {
            chunk_size: s.chunk_size,
            file_time_format: s.file_time_format,
            file_extension: s.file_extension,
        };
        let storage = TieredStorage::new(dir, prefix, opts)?;
        config::freeze();
        Ok(Self::from_backend(sink, tags, Backend::Tiered(storage)))
    }

    /// Derives a child logger that stores its records through this one.
    ///
    /// The child keeps only an index mapping into the parent, inherits
    /// the parent's tags on every record (the parent re-injects them),
    /// and adds its own. With `parent_out == false` the parent never
    /// emits the child's records on its own sink; the child still applies
    /// its own sink policy.
    ///
    /// The parent must outlive the child: close children first.
    #[must_use]
    pub fn clone_with(&self, sink: Option<Sink>, parent_out: bool, tags: &[&str]) -> Self {
        let child = Self::from_backend(
            sink,
            tags,
            Backend::Clone(CloneNode {
                parent: self.clone(),
                parent_out,
                v: RwLock::new(Vec::new()),
            }),
        );
        child.node.extras_disabled.store(
            self.node.extras_disabled.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        child
    }

    fn from_backend(sink: Option<Sink>, tags: &[&str], backend: Backend) -> Self {
        Self {
            node: Arc::new(Node {
                sink,
                tags: tags.iter().map(|t| (*t).to_lowercase()).collect(),
                backend,
                writer: Mutex::new(WriterState { written: 0 }),
                align_lock: Mutex::new(()),
                counter: AtomicUsize::new(0),
                heavy_load: AtomicBool::new(false),
                extras_disabled: AtomicBool::new(false),
                open: AtomicBool::new(true),
                monitor: Mutex::new(MonitorSlot::default()),
            }),
        }
    }

    /// Records a log, returning its index for this logger.
    ///
    /// With `write_output == false` the record is stored but never
    /// emitted on any sink (the emission watermark still advances, so
    /// later records are unaffected).
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after [`close`](Self::close);
    /// [`Error::Storage`] on a fatal disk failure in a tiered backend.
    pub fn add_log(
        &self,
        level: LogLevel,
        message: &str,
        extra: &str,
        write_output: bool,
    ) -> Result<usize> {
        if !self.node.open.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.node.new_log(Log::new(level, message, extra), write_output)
    }

    /// Records `message` at `level`. Everything after the first newline
    /// becomes the extra field. Failures are reported, not returned.
    pub fn print(&self, level: LogLevel, message: impl fmt::Display) {
        let text = message.to_string();
        let (msg, extra) = match text.split_once('\n') {
            Some((m, e)) => (m, e),
            None => (text.as_str(), ""),
        };
        if let Err(e) = self.add_log(level, msg, extra, true) {
            tracing::error!(error = %e, "failed to record log");
        }
    }

    /// [`print`](Self::print) over pre-built format arguments:
    /// `logger.printf(LogLevel::Info, format_args!("{} jobs", n))`.
    pub fn printf(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        self.print(level, args);
    }

    /// Shorthand for a Debug-level [`print`](Self::print).
    pub fn debug(&self, message: impl fmt::Display) {
        self.print(LogLevel::Debug, message);
    }

    /// Returns the record at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] for unassigned indices; storage errors
    /// propagate from tiered backends.
    pub fn log_at(&self, index: usize) -> Result<Log> {
        self.node.log_at(index)
    }

    /// Returns the records in `[start, end)`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] for malformed intervals.
    pub fn logs_in(&self, start: usize, end: usize) -> Result<Vec<Log>> {
        self.node.logs_in(start, end)
    }

    /// Returns the most recent `count` records, clamped to the total.
    ///
    /// # Errors
    ///
    /// Storage errors propagate from tiered backends.
    pub fn last_logs(&self, count: usize) -> Result<Vec<Log>> {
        let total = self.n_logs();
        let count = count.min(total);
        self.logs_in(total - count, total)
    }

    /// Returns the records at the given ascending indices.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if any index was never assigned.
    pub fn logs_at(&self, indices: &[usize]) -> Result<Vec<Log>> {
        self.node.logs_at(indices)
    }

    /// Number of records created through this logger.
    #[must_use]
    pub fn n_logs(&self) -> usize {
        self.node.n_logs()
    }

    /// The sink this logger emits to; for a sink-less clone, the
    /// parent's.
    #[must_use]
    pub fn sink(&self) -> Option<&Sink> {
        match &self.node.backend {
            Backend::Clone(c) if self.node.sink.is_none() => c.parent.sink(),
            _ => self.node.sink.as_ref(),
        }
    }

    /// Tags attached to every record created through this logger.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.node.tags
    }

    /// Whether the controller currently considers this logger under heavy
    /// load (synchronous emission and direct persistence deferred).
    #[must_use]
    pub fn heavy_load(&self) -> bool {
        self.node.heavy_load.load(Ordering::Relaxed)
    }

    /// Emits the extra field with each record (the default).
    pub fn enable_extras(&self) {
        self.node.extras_disabled.store(false, Ordering::Relaxed);
    }

    /// Suppresses the extra field on emission. Records still store it.
    pub fn disable_extras(&self) {
        self.node.extras_disabled.store(true, Ordering::Relaxed);
    }

    /// Starts the heavy-load controller with the process-wide defaults.
    ///
    /// The controller samples ingest rate every scan interval, defers
    /// emission and persistence under load, and drains both once the
    /// node is quiescent again. Starting twice is a no-op; the controller
    /// is joined by [`close`](Self::close).
    pub fn enable_heavy_load_detection(&self) {
        self.enable_heavy_load_detection_with(MonitorOptions::default());
    }

    /// Starts the heavy-load controller with explicit parameters.
    pub fn enable_heavy_load_detection_with(&self, opts: MonitorOptions) {
        // Without a sink there is nothing to defer unless persistence is
        // tiered (the memory watchdog still matters there).
        if self.node.sink.is_none() && !matches!(self.node.backend, Backend::Tiered(_)) {
            return;
        }

        let mut slot = self.node.monitor.lock();
        if slot.started || !self.node.open.load(Ordering::Acquire) {
            return;
        }
        slot.started = true;
        let (shutdown, handle) = monitor::spawn(Arc::downgrade(&self.node), opts);
        slot.shutdown = Some(shutdown);
        slot.handle = Some(handle);
    }

    /// Drains every deferred sink emission and, for tiered backends,
    /// every pending disk write.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on disk failure during the drain.
    pub fn align(&self) -> Result<()> {
        self.node.drain_all(config::settings().max_logs_per_scan)
    }

    /// Stops the controller (waiting for its acknowledgement), performs a
    /// final drain of sink and storage, and marks the logger closed.
    ///
    /// Subsequent appends fail with [`Error::Closed`]; reads keep
    /// working. Closing twice is a no-op. Close children before their
    /// parent.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on disk failure during the final drain.
    pub fn close(&self) -> Result<()> {
        if !self.node.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.node.stop_monitor();
        self.node.drain_all(config::settings().max_logs_per_scan)
    }
}

impl Node {
    pub(crate) fn new_log(&self, mut log: Log, write_output: bool) -> Result<usize> {
        self.counter.fetch_add(1, Ordering::Relaxed);
        log.add_tags(self.tags.iter());

        let p = match &self.backend {
            Backend::Memory(storage) => storage.add_log(log.clone()),
            Backend::Tiered(storage) => storage.add_log(log.clone())?,
            Backend::Clone(clone) => {
                let parent_write = clone.parent_out && write_output;
                // The vector lock is held across the parent call so
                // concurrent appends cannot interleave their parent
                // indices; `v` stays strictly ascending.
                let mut v = clone.v.write();
                let parent_index = clone.parent.node.new_log(log.clone(), parent_write)?;
                v.push(parent_index);
                v.len() - 1
            }
        };

        self.emit_or_account(p, &log, write_output);
        Ok(p)
    }

    /// Applies the emission decision for the record at index `p`.
    ///
    /// The gate (`written == p`, not under heavy load) and the watermark
    /// update happen under the sink-emission lock, so concurrent
    /// producers can never emit out of index order. When emission is
    /// suppressed the watermark still advances.
    fn emit_or_account(&self, p: usize, log: &Log, write_output: bool) {
        let mut w = self.writer.lock();

        let Some(sink) = &self.sink else {
            w.written = w.written.max(p + 1);
            return;
        };
        if !write_output {
            w.written = w.written.max(p + 1);
            return;
        }

        if !self.heavy_load.load(Ordering::Relaxed) && w.written == p {
            w.written = p + 1;
            output::emit(sink, log, self.extras_disabled.load(Ordering::Relaxed));
        }
    }

    pub(crate) fn log_at(&self, index: usize) -> Result<Log> {
        match &self.backend {
            Backend::Memory(storage) => storage.log_at(index),
            Backend::Tiered(storage) => storage.log_at(index),
            Backend::Clone(clone) => {
                let parent_index = {
                    let v = clone.v.read();
                    *v.get(index).ok_or(Error::OutOfRange {
                        index,
                        len: v.len(),
                    })?
                };
                clone.parent.node.log_at(parent_index)
            }
        }
    }

    pub(crate) fn logs_in(&self, start: usize, end: usize) -> Result<Vec<Log>> {
        match &self.backend {
            Backend::Memory(storage) => storage.logs_in(start, end),
            Backend::Tiered(storage) => storage.logs_in(start, end),
            Backend::Clone(clone) => {
                let parent_indices = {
                    let v = clone.v.read();
                    if start > end || end > v.len() {
                        return Err(Error::InvalidRange {
                            start,
                            end,
                            len: v.len(),
                        });
                    }
                    v[start..end].to_vec()
                };
                clone.parent.node.logs_at(&parent_indices)
            }
        }
    }

    pub(crate) fn logs_at(&self, indices: &[usize]) -> Result<Vec<Log>> {
        match &self.backend {
            Backend::Memory(storage) => storage.logs_at(indices),
            Backend::Tiered(storage) => storage.logs_at(indices),
            Backend::Clone(clone) => {
                let parent_indices = {
                    let v = clone.v.read();
                    indices
                        .iter()
                        .map(|&i| {
                            v.get(i).copied().ok_or(Error::OutOfRange {
                                index: i,
                                len: v.len(),
                            })
                        })
                        .collect::<Result<Vec<_>>>()?
                };
                clone.parent.node.logs_at(&parent_indices)
            }
        }
    }

    pub(crate) fn n_logs(&self) -> usize {
        match &self.backend {
            Backend::Memory(storage) => storage.n_logs(),
            Backend::Tiered(storage) => storage.n_logs(),
            Backend::Clone(clone) => clone.v.read().len(),
        }
    }

    /// Flips the heavy-load flag on the writer and, for tiered backends,
    /// on the storage; the two always move together.
    pub(crate) fn set_heavy(&self, value: bool) {
        self.heavy_load.store(value, Ordering::Relaxed);
        if let Backend::Tiered(storage) = &self.backend {
            storage.set_heavy_load(value);
        }
    }

    /// Emits records in `(written, n)` in ascending order, in slices of
    /// at most `batch`, updating the watermark after each slice.
    ///
    /// With `drain == false` the pass gives up as soon as heavy load
    /// returns. At most one alignment pass runs at a time.
    pub(crate) fn align_output(&self, drain: bool, batch: usize) -> Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        let batch = batch.max(1);
        let _guard = self.align_lock.lock();

        loop {
            if !drain && self.heavy_load.load(Ordering::Relaxed) {
                break;
            }

            let n = self.n_logs();
            let from = self.writer.lock().written;
            if from >= n {
                break;
            }
            let to = n.min(from + batch);
            let logs = self.logs_in(from, to)?;

            let Some(sink) = &self.sink else { break };
            let extras_disabled = self.extras_disabled.load(Ordering::Relaxed);

            let mut w = self.writer.lock();
            // A suppressed append may have advanced the watermark while
            // the slice was being read; emit only what is still owed.
            let skip = w.written.saturating_sub(from);
            for log in logs.iter().skip(skip) {
                output::emit(sink, log, extras_disabled);
            }
            w.written = w.written.max(to);
        }

        Ok(())
    }

    /// Full drain of the sink queue and, for tiered backends, the pending
    /// disk writes.
    pub(crate) fn drain_all(&self, batch: usize) -> Result<()> {
        self.align_output(true, batch)?;
        if let Backend::Tiered(storage) = &self.backend {
            storage.align_storage(true)?;
        }
        Ok(())
    }

    /// Signals the controller, waits for its acknowledgement, and joins
    /// it. Safe to call when no controller was ever started.
    fn stop_monitor(&self) {
        let (shutdown, handle) = {
            let mut slot = self.monitor.lock();
            (slot.shutdown.take(), slot.handle.take())
        };

        let on_monitor_thread = handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id());

        if let Some(tx) = shutdown {
            if on_monitor_thread {
                // The controller itself released the last handle; dropping
                // the sender disconnects the channel and ends its loop.
                drop(tx);
            } else {
                let (ack_tx, ack_rx) = mpsc::channel();
                if tx.send(ack_tx).is_ok() {
                    let _ = ack_rx.recv();
                }
            }
        }

        if let Some(handle) = handle {
            if !on_monitor_thread {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.stop_monitor();
            if let Err(e) = self.drain_all(config::settings().max_logs_per_scan) {
                tracing::error!(error = %e, "error draining logger on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use super::*;

    #[derive(Clone, Default)]
    struct CaptureBuf(Arc<Mutex<Vec<u8>>>);

    impl CaptureBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(ToString::to_string)
                .collect()
        }
    }

    impl Write for CaptureBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_append_assigns_dense_indices() {
        let logger = Logger::memory(None, &[]);
        for i in 0..5 {
            let p = logger.add_log(LogLevel::Info, &format!("m#{i}"), "", true).unwrap();
            assert_eq!(p, i);
        }
        assert_eq!(logger.n_logs(), 5);
    }

    #[test]
    fn test_tags_are_injected() {
        let logger = Logger::memory(None, &["Server", "HTTP"]);
        logger.add_log(LogLevel::Info, "m", "", true).unwrap();
        assert_eq!(logger.log_at(0).unwrap().tags(), ["server", "http"]);
    }

    #[test]
    fn test_synchronous_emission_in_order() {
        let buf = CaptureBuf::default();
        let logger = Logger::memory(Some(Sink::writer(buf.clone())), &[]);
        for i in 0..10 {
            logger.add_log(LogLevel::Info, &format!("m#{i}"), "", true).unwrap();
        }
        let lines = buf.lines();
        assert_eq!(lines.len(), 10);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("m#{i}")), "line {i}: {line}");
        }
    }

    #[test]
    fn test_suppressed_emission_advances_watermark() {
        let buf = CaptureBuf::default();
        let logger = Logger::memory(Some(Sink::writer(buf.clone())), &[]);
        logger.add_log(LogLevel::Info, "visible", "", true).unwrap();
        logger.add_log(LogLevel::Info, "hidden", "", false).unwrap();
        logger.add_log(LogLevel::Info, "visible too", "", true).unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("visible"));
        assert!(lines[1].ends_with("visible too"));

        // The alignment pass owes nothing.
        logger.align().unwrap();
        assert_eq!(buf.lines().len(), 2);
    }

    #[test]
    fn test_heavy_load_defers_and_align_catches_up() {
        let buf = CaptureBuf::default();
        let logger = Logger::memory(Some(Sink::writer(buf.clone())), &[]);

        logger.node.set_heavy(true);
        for i in 0..5 {
            logger.add_log(LogLevel::Info, &format!("m#{i}"), "", true).unwrap();
        }
        assert!(buf.lines().is_empty());

        logger.node.set_heavy(false);
        logger.align().unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("m#{i}")));
        }
    }

    #[test]
    fn test_print_splits_extra_at_newline() {
        let logger = Logger::memory(None, &[]);
        logger.print(LogLevel::Warning, "head\ntail line 1\ntail line 2");
        let log = logger.log_at(0).unwrap();
        assert_eq!(log.message(), "head");
        assert_eq!(log.extra(), "tail line 1\ntail line 2");
    }

    #[test]
    fn test_printf_formats() {
        let logger = Logger::memory(None, &[]);
        logger.printf(LogLevel::Info, format_args!("{} of {}", 3, 7));
        assert_eq!(logger.log_at(0).unwrap().message(), "3 of 7");
    }

    #[test]
    fn test_last_logs_clamps() {
        let logger = Logger::memory(None, &[]);
        for i in 0..4 {
            logger.add_log(LogLevel::Info, &format!("m#{i}"), "", true).unwrap();
        }
        let logs = logger.last_logs(10).unwrap();
        assert_eq!(logs.len(), 4);
        let logs = logger.last_logs(2).unwrap();
        assert_eq!(logs[0].message(), "m#2");
        assert_eq!(logs[1].message(), "m#3");
    }

    #[test]
    fn test_clone_projects_into_parent() {
        let root = Logger::memory(None, &["root"]);
        root.add_log(LogLevel::Info, "before", "", true).unwrap();

        let child = root.clone_with(None, false, &["x"]);
        let ci = child.add_log(LogLevel::Info, "hi", "", true).unwrap();
        assert_eq!(ci, 0);
        assert_eq!(child.n_logs(), 1);
        assert_eq!(root.n_logs(), 2);

        let from_child = child.log_at(0).unwrap();
        let from_root = root.log_at(1).unwrap();
        assert_eq!(from_child.id(), from_root.id());
        assert_eq!(from_child.tags(), ["x", "root"]);
    }

    #[test]
    fn test_clone_sink_policy() {
        let parent_buf = CaptureBuf::default();
        let child_buf = CaptureBuf::default();
        let root = Logger::memory(Some(Sink::writer(parent_buf.clone())), &[]);
        let child = root.clone_with(Some(Sink::writer(child_buf.clone())), false, &[]);

        child.add_log(LogLevel::Info, "only on child", "", true).unwrap();
        assert!(parent_buf.lines().is_empty());
        assert_eq!(child_buf.lines().len(), 1);

        let echoing = root.clone_with(None, true, &[]);
        echoing.add_log(LogLevel::Info, "through parent", "", true).unwrap();
        assert_eq!(parent_buf.lines().len(), 1);
        assert!(parent_buf.lines()[0].ends_with("through parent"));
    }

    #[test]
    fn test_clone_range_reads_project() {
        let root = Logger::memory(None, &[]);
        root.add_log(LogLevel::Info, "noise", "", true).unwrap();
        let child = root.clone_with(None, false, &[]);
        for i in 0..6 {
            child.add_log(LogLevel::Info, &format!("c#{i}"), "", true).unwrap();
            root.add_log(LogLevel::Info, "noise", "", true).unwrap();
        }

        let logs = child.logs_in(1, 4).unwrap();
        let messages: Vec<_> = logs.iter().map(Log::message).collect();
        assert_eq!(messages, ["c#1", "c#2", "c#3"]);

        let logs = child.logs_at(&[0, 2, 5]).unwrap();
        let messages: Vec<_> = logs.iter().map(Log::message).collect();
        assert_eq!(messages, ["c#0", "c#2", "c#5"]);

        assert!(child.log_at(6).is_err());
        assert!(child.logs_in(2, 9).is_err());
    }

    #[test]
    fn test_nested_clones_reach_the_root() {
        let root = Logger::memory(None, &["a"]);
        let mid = root.clone_with(None, false, &["b"]);
        let leaf = mid.clone_with(None, false, &["c"]);

        leaf.add_log(LogLevel::Info, "deep", "", true).unwrap();
        assert_eq!(root.n_logs(), 1);
        assert_eq!(leaf.log_at(0).unwrap().tags(), ["c", "b", "a"]);
        assert_eq!(leaf.log_at(0).unwrap().id(), root.log_at(0).unwrap().id());
    }

    #[test]
    fn test_closed_logger_rejects_appends() {
        let logger = Logger::memory(None, &[]);
        logger.add_log(LogLevel::Info, "m", "", true).unwrap();
        logger.close().unwrap();

        assert!(matches!(
            logger.add_log(LogLevel::Info, "late", "", true),
            Err(Error::Closed)
        ));
        // Reads still work.
        assert_eq!(logger.log_at(0).unwrap().message(), "m");
        // Closing twice is fine.
        logger.close().unwrap();
    }

    #[test]
    fn test_close_drains_deferred_emission() {
        let buf = CaptureBuf::default();
        let logger = Logger::memory(Some(Sink::writer(buf.clone())), &[]);
        logger.node.set_heavy(true);
        for i in 0..7 {
            logger.add_log(LogLevel::Info, &format!("m#{i}"), "", true).unwrap();
        }
        assert!(buf.lines().is_empty());

        logger.close().unwrap();
        assert_eq!(buf.lines().len(), 7);
    }

    #[test]
    fn test_extras_disabled_inherited_by_clone() {
        let logger = Logger::memory(None, &[]);
        logger.disable_extras();
        let child = logger.clone_with(None, false, &[]);
        assert!(child.node.extras_disabled.load(Ordering::Relaxed));
    }
}
