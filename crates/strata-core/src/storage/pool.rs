//! Process-wide free list for pending-buffer allocations.
//!
//! Under bursty ingest the tiered engine allocates and releases one
//! `Vec<Log>` of capacity `K` per chunk. Recycling them through a shared
//! pool keeps allocation churn flat regardless of how many loggers exist.

use parking_lot::Mutex;

use crate::record::Log;

/// Upper bound on retained buffers; beyond this they are simply dropped.
const MAX_POOLED: usize = 32;

static POOL: Mutex<Vec<Vec<Log>>> = Mutex::new(Vec::new());

/// Takes a cleared buffer with at least `capacity` reserved.
pub(crate) fn take(capacity: usize) -> Vec<Log> {
    let mut pool = POOL.lock();
    match pool.pop() {
        Some(mut buf) => {
            buf.clear();
            buf.reserve(capacity.saturating_sub(buf.capacity()));
            buf
        }
        None => Vec::with_capacity(capacity),
    }
}

/// Returns a buffer to the pool.
pub(crate) fn put(mut buf: Vec<Log>) {
    buf.clear();
    let mut pool = POOL.lock();
    if pool.len() < MAX_POOLED {
        pool.push(buf);
    }
}
