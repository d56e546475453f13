//! Storage engines - where appended records live.
//!
//! | Engine | Memory use | Persistence | Use when |
//! | ------ | ---------- | ----------- | -------- |
//! | [`MemoryStorage`] | Unbounded | None | Short-lived processes, tests |
//! | [`TieredStorage`] | Bounded ring of `K` records | Chunked append-only files | History may exceed memory |
//!
//! Both engines assign dense, monotonically increasing indices in append
//! order; reads by index, range, or ascending index-set return exactly the
//! records that were appended, in order.

pub mod memory;
mod pool;
pub mod tiered;

pub use memory::MemoryStorage;
pub use tiered::{ChunkOptions, TieredStorage};
