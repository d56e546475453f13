//! Tiered storage: a bounded in-memory ring over the newest records, with
//! everything spilled to fixed-size append-only chunk files.
//!
//! Record `i` lives in exactly one of three regions:
//!
//! - the **ring** when `i >= n - K` (the newest up-to-`K` records);
//! - **on disk**, in chunk `i / K` at line `i % K`, when `i < stored`;
//! - the **pending buffer** of chunk `i / K` otherwise, holding records
//!   whose disk write was deferred under heavy load.
//!
//! `n = stored + Σ len(buffer[c])` at all times. Chunk files are only ever
//! appended to; a fully drained chunk holds exactly `K` JSON lines (the
//! last chunk may be partial).
//!
//! Lock discipline: `state` (ring, counters, append handle) is always
//! acquired before `pending` (drain watermark + buffers). Draining holds
//! only `pending`, so it can never deadlock with an appender.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use hashbrown::HashMap;
use parking_lot::RwLock;
use strata_common::{Error, Result};

use super::pool;
use crate::record::Log;

/// Parameters fixed at construction of a [`TieredStorage`].
///
/// These are process-wide in spirit: every storage created by the same
/// process should use the same values, or old chunk files become
/// unaddressable.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Ring capacity and number of lines per chunk file.
    pub chunk_size: usize,
    /// chrono layout for the filename timestamp.
    pub file_time_format: String,
    /// Extension of the chunk files.
    pub file_extension: String,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            file_time_format: "%y.%m.%d-%H.%M.%S".to_string(),
            file_extension: "data".to_string(),
        }
    }
}

impl ChunkOptions {
    /// Sets the ring capacity / lines per chunk.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the filename timestamp layout.
    #[must_use]
    pub fn with_file_time_format(mut self, format: impl Into<String>) -> Self {
        self.file_time_format = format.into();
        self
    }

    /// Sets the chunk file extension.
    #[must_use]
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }
}

/// Ring and append-file state, guarded by the outer lock.
struct State {
    /// Total records ever appended.
    n: usize,
    /// Index of the chunk currently open for append.
    chunks: usize,
    /// Circular buffer of the newest up-to-`K` records.
    cache: Vec<Log>,
    /// Position of the oldest ring entry once the ring is full.
    cache_head: usize,
    /// Append handle for chunk `chunks`.
    file: File,
}

/// Drain watermark and deferred writes, guarded by the inner lock.
struct Pending {
    /// Count of records persisted to disk; record `i` is on disk iff
    /// `i < stored`.
    stored: usize,
    /// Per-chunk queues of records whose disk write was deferred.
    buffer: HashMap<usize, Vec<Log>>,
}

/// Ring cache over the newest `K` records plus chunked append-only files.
pub struct TieredStorage {
    dir: PathBuf,
    prefix: String,
    opts: ChunkOptions,
    heavy_load: AtomicBool,
    state: RwLock<State>,
    pending: RwLock<Pending>,
}

impl TieredStorage {
    /// Creates a storage writing chunk files named
    /// `<prefix>-<timestamp>-<chunkIndex>.<ext>` under `dir`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `dir` does not exist, is not a directory, or
    /// the initial chunk file cannot be created.
    pub fn new(dir: impl AsRef<Path>, prefix: &str, opts: ChunkOptions) -> Result<Self> {
        if opts.chunk_size == 0 {
            return Err(Error::config("chunk size must be at least 1"));
        }

        let dir = std::path::absolute(dir.as_ref())
            .map_err(|e| Error::config(format!("cannot resolve log directory: {e}")))?;

        let meta = fs::metadata(&dir)
            .map_err(|e| Error::config(format!("log directory {}: {e}", dir.display())))?;
        if !meta.is_dir() {
            return Err(Error::config(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let prefix = format!(
            "{prefix}-{}-",
            Local::now().format(&opts.file_time_format)
        );

        let first = dir.join(format!("{prefix}0.{}", opts.file_extension));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&first)
            .map_err(|e| Error::config(format!("cannot create {}: {e}", first.display())))?;

        Ok(Self {
            dir,
            prefix,
            opts,
            heavy_load: AtomicBool::new(false),
            state: RwLock::new(State {
                n: 0,
                chunks: 0,
                cache: Vec::new(),
                cache_head: 0,
                file,
            }),
            pending: RwLock::new(Pending {
                stored: 0,
                buffer: HashMap::new(),
            }),
        })
    }

    /// Path of the chunk file with the given index.
    #[must_use]
    pub fn chunk_file(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{index}.{}", self.prefix, self.opts.file_extension))
    }

    /// The options this storage was built with.
    #[must_use]
    pub fn options(&self) -> &ChunkOptions {
        &self.opts
    }

    /// Appends a record, returning its global index.
    ///
    /// When the process is quiescent and every earlier record is already
    /// persisted, the record is written straight to the current chunk
    /// file; otherwise it is queued in the chunk's pending buffer for the
    /// alignment pass.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on disk I/O failure during the write or a chunk
    /// rotation. This is fatal: the storage can no longer guarantee that
    /// no record is lost.
    pub fn add_log(&self, log: Log) -> Result<usize> {
        let k = self.opts.chunk_size;
        let mut st = self.state.write();
        let p = st.n;

        if st.cache.len() < k {
            st.cache.push(log.clone());
        } else {
            let head = st.cache_head;
            st.cache[head] = log.clone();
            st.cache_head = (head + 1) % k;

            if p % k == 0 {
                // The previous chunk is complete: rotate the append handle.
                st.chunks += 1;
                let path = self.chunk_file(st.chunks);
                st.file = OpenOptions::new().create(true).append(true).open(path)?;
            }
        }

        let mut pend = self.pending.write();
        if !self.heavy_load.load(Ordering::Relaxed) && pend.stored == p {
            write_record(&mut st.file, &log)?;
            pend.stored = p + 1;
        } else {
            pend.buffer
                .entry(st.chunks)
                .or_insert_with(|| pool::take(k))
                .push(log);
        }

        st.n = p + 1;
        Ok(p)
    }

    /// Returns the record at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] for an unassigned index, [`Error::Storage`]
    /// on I/O failure, [`Error::Decode`] if the persisted line is
    /// malformed.
    pub fn log_at(&self, index: usize) -> Result<Log> {
        let k = self.opts.chunk_size;
        let st = self.state.read();
        if index >= st.n {
            return Err(Error::OutOfRange { index, len: st.n });
        }

        if st.n <= k || index >= st.n - k {
            return Ok(ring_record(&st, k, index));
        }

        {
            let pend = self.pending.read();
            if index >= pend.stored {
                return pending_record(&pend, k, index)
                    .ok_or_else(|| missing_record(index));
            }
        }

        drop(st);
        self.read_disk_single(index / k, index % k)
    }

    /// Returns the records in `[start, end)`.
    ///
    /// The interval is partitioned into pieces that lie entirely within
    /// one chunk or entirely within the ring; each on-disk piece opens its
    /// chunk once and scans forward. Records past the drain watermark are
    /// served from the pending buffers.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] for a malformed interval, [`Error::Storage`]
    /// on I/O failure. Malformed persisted lines are reported and omitted
    /// from the result.
    pub fn logs_in(&self, start: usize, end: usize) -> Result<Vec<Log>> {
        let k = self.opts.chunk_size;
        let st = self.state.read();
        if start > end || end > st.n {
            return Err(Error::InvalidRange {
                start,
                end,
                len: st.n,
            });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let tail = st.n.saturating_sub(k);
        let mut out = Vec::with_capacity(end - start);

        for iv in split_range(st.n, k, start, end) {
            if iv.start >= tail {
                for i in iv.start..iv.end {
                    out.push(ring_record(&st, k, i));
                }
            } else {
                let pend = self.pending.read();
                self.read_disk_interval(&pend, k, iv, &mut out)?;
            }
        }

        Ok(out)
    }

    /// Returns the records at the given ascending indices.
    ///
    /// Indices are grouped by chunk; each chunk is opened once and scanned
    /// forward without rewinding. Indices past the drain watermark are
    /// served from the pending buffers.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if any index was never assigned,
    /// [`Error::Storage`] on I/O failure. Malformed persisted lines are
    /// reported and omitted.
    pub fn logs_at(&self, indices: &[usize]) -> Result<Vec<Log>> {
        let Some(&last) = indices.last() else {
            return Ok(Vec::new());
        };

        let k = self.opts.chunk_size;
        let st = self.state.read();
        if last >= st.n {
            return Err(Error::OutOfRange {
                index: last,
                len: st.n,
            });
        }

        let tail = st.n.saturating_sub(k);
        let split = indices.partition_point(|&i| i < tail);
        let (disk_indices, ring_indices) = indices.split_at(split);

        let mut out = Vec::with_capacity(indices.len());

        if !disk_indices.is_empty() {
            let pend = self.pending.read();
            let mut group_start = 0;
            while group_start < disk_indices.len() {
                let c = disk_indices[group_start] / k;
                let rest = &disk_indices[group_start..];
                let group_len = rest.partition_point(|&i| i / k == c);
                self.read_disk_set(&pend, k, c, &rest[..group_len], &mut out)?;
                group_start += group_len;
            }
        }

        for &i in ring_indices {
            out.push(ring_record(&st, k, i));
        }

        Ok(out)
    }

    /// Drains pending buffers to their chunk files, in index order.
    ///
    /// With `drain == false` the pass stops as soon as the heavy-load flag
    /// turns back on; with `drain == true` it runs until every buffer is
    /// empty. At most one drain runs at a time.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on disk I/O failure; the affected buffer is kept
    /// so no record is dropped, but the storage should be considered
    /// unrecoverable.
    pub fn align_storage(&self, drain: bool) -> Result<()> {
        let k = self.opts.chunk_size;
        let mut pend = self.pending.write();

        loop {
            if !drain && self.heavy_load.load(Ordering::Relaxed) {
                break;
            }

            let c = pend.stored / k;
            let Some(buf) = pend.buffer.remove(&c) else {
                break;
            };
            if buf.is_empty() {
                pool::put(buf);
                break;
            }

            match self.append_buffer(c, &buf) {
                Ok(()) => {
                    pend.stored += buf.len();
                    pool::put(buf);
                }
                Err(e) => {
                    pend.buffer.insert(c, buf);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Flips the flag that defers direct persistence.
    pub fn set_heavy_load(&self, value: bool) {
        self.heavy_load.store(value, Ordering::Relaxed);
    }

    /// Whether direct persistence is currently deferred.
    #[must_use]
    pub fn heavy_load(&self) -> bool {
        self.heavy_load.load(Ordering::Relaxed)
    }

    /// Total records appended so far.
    #[must_use]
    pub fn n_logs(&self) -> usize {
        self.state.read().n
    }

    /// Count of records persisted to disk.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.pending.read().stored
    }

    /// Count of records waiting in pending buffers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.read().buffer.values().map(Vec::len).sum()
    }

    /// Whether any record is waiting in a pending buffer.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.read().buffer.values().any(|b| !b.is_empty())
    }

    /// Index of the chunk currently open for append.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.state.read().chunks
    }

    fn append_buffer(&self, c: usize, buf: &[Log]) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(self.chunk_file(c))?;
        let mut w = BufWriter::new(file);
        for log in buf {
            let line = serde_json::to_vec(log).map_err(io::Error::from)?;
            w.write_all(&line)?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
        Ok(())
    }

    fn read_disk_single(&self, c: usize, line_idx: usize) -> Result<Log> {
        let file = File::open(self.chunk_file(c))?;
        let mut lines = BufReader::new(file).lines();

        for _ in 0..line_idx {
            match lines.next() {
                Some(line) => drop(line?),
                None => return Err(missing_record(c * self.opts.chunk_size + line_idx)),
            }
        }

        match lines.next() {
            Some(Ok(line)) => serde_json::from_str(&line).map_err(|source| Error::Decode {
                chunk: c,
                line: line_idx,
                source,
            }),
            Some(Err(e)) => Err(e.into()),
            None => Err(missing_record(c * self.opts.chunk_size + line_idx)),
        }
    }

    /// Reads `[iv.start, iv.end)`, all within chunk `iv.start / K`, into
    /// `out`. Indices past the drain watermark come from the chunk's
    /// pending buffer.
    fn read_disk_interval(
        &self,
        pend: &Pending,
        k: usize,
        iv: Interval,
        out: &mut Vec<Log>,
    ) -> Result<()> {
        let c = iv.start / k;
        let file = File::open(self.chunk_file(c))?;
        let mut lines = BufReader::new(file).lines();

        // Only skip when the interval actually starts on disk; a fully
        // deferred interval may face a chunk file shorter than the skip.
        if iv.start < pend.stored {
            for _ in 0..(iv.start % k) {
                match lines.next() {
                    Some(line) => drop(line?),
                    None => return Err(missing_record(iv.start)),
                }
            }
        }

        for i in iv.start..iv.end {
            if i < pend.stored {
                match lines.next() {
                    Some(Ok(line)) => push_parsed(&line, c, i % k, out),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(missing_record(i)),
                }
            } else {
                out.push(pending_record(pend, k, i).ok_or_else(|| missing_record(i))?);
            }
        }

        Ok(())
    }

    /// Reads the ascending `indices`, all within chunk `c`, into `out`,
    /// advancing a single scanner and never rewinding.
    fn read_disk_set(
        &self,
        pend: &Pending,
        k: usize,
        c: usize,
        indices: &[usize],
        out: &mut Vec<Log>,
    ) -> Result<()> {
        let file = File::open(self.chunk_file(c))?;
        let mut lines = BufReader::new(file).lines();
        let mut consumed = 0usize;

        for &i in indices {
            if i < pend.stored {
                let line_idx = i % k;
                while consumed < line_idx {
                    match lines.next() {
                        Some(line) => drop(line?),
                        None => return Err(missing_record(i)),
                    }
                    consumed += 1;
                }
                match lines.next() {
                    Some(Ok(line)) => {
                        consumed += 1;
                        push_parsed(&line, c, line_idx, out);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(missing_record(i)),
                }
            } else {
                out.push(pending_record(pend, k, i).ok_or_else(|| missing_record(i))?);
            }
        }

        Ok(())
    }
}

/// A half-open interval of global indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    start: usize,
    end: usize,
}

/// Partitions `[start, end)` into intervals that lie entirely within one
/// chunk or entirely within the ring tail. The ring piece, if any, comes
/// last.
fn split_range(n: usize, k: usize, start: usize, end: usize) -> Vec<Interval> {
    let tail = n.saturating_sub(k);
    let mut parts = Vec::new();
    let mut end = end;
    let mut tail_part = None;

    if end > tail {
        if start < tail {
            tail_part = Some(Interval { start: tail, end });
            end = tail;
        } else {
            parts.push(Interval { start, end });
            return parts;
        }
    }

    let mut cur = Interval {
        start,
        end: start + 1,
    };
    for i in (start + 1)..end {
        if i % k == 0 {
            parts.push(cur);
            cur = Interval { start: i, end: i + 1 };
        } else {
            cur.end += 1;
        }
    }
    parts.push(cur);

    if let Some(t) = tail_part {
        parts.push(t);
    }
    parts
}

/// Maps a global index into the ring. Callers guarantee the index is in
/// the cached region.
fn ring_record(st: &State, k: usize, index: usize) -> Log {
    if st.n <= k {
        st.cache[index].clone()
    } else {
        st.cache[(index - (st.n - k) + st.cache_head) % k].clone()
    }
}

/// Looks up a deferred record. The buffer of a complete chunk holds its
/// last `len` records; the first `K - len` are on disk.
fn pending_record(pend: &Pending, k: usize, index: usize) -> Option<Log> {
    let buf = pend.buffer.get(&(index / k))?;
    let offset = (index % k).checked_sub(k - buf.len())?;
    buf.get(offset).cloned()
}

fn push_parsed(line: &str, chunk: usize, line_idx: usize, out: &mut Vec<Log>) {
    match serde_json::from_str(line) {
        Ok(log) => out.push(log),
        Err(e) => {
            tracing::warn!(chunk, line = line_idx, error = %e, "skipping malformed log record");
        }
    }
}

fn missing_record(index: usize) -> Error {
    Error::Storage(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("record {index} missing from chunk file and pending buffer"),
    ))
}

fn write_record(file: &mut File, log: &Log) -> Result<()> {
    let line = serde_json::to_vec(log).map_err(io::Error::from)?;
    file.write_all(&line)?;
    file.write_all(b"\n")?;
    Ok(())
}
