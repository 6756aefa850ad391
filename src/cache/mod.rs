//! Tuple Cache Module
//!
//! Read cache over the storage engine, one ordered cache per index, all
//! sharing one environment.
//!
//! ## Responsibilities
//! - Keep recently read committed tuples in key order
//! - Remember proven gaps (link flags, boundary levels) so searches can be
//!   answered without the engine
//! - Forget affected tuples and gaps on every write
//! - Evict least recently used tuples across all caches under one quota
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────── CacheEnv ─────────────────────────────┐
//! │  EntryArena: [e0][e1][e2][e3] ...   LRU: head → e2 → e0 → e3 → tail │
//! │                                                                    │
//! │  CacheTree #0: BTreeMap<TreeKey, EntryId>  (e0, e2)                │
//! │  CacheTree #1: BTreeMap<TreeKey, EntryId>  (e1, e3)                │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

mod entry;
mod env;
mod iterator;
mod lru;
mod tuple_cache;

pub(crate) use entry::TreeKey;
pub use env::{CacheEnv, CacheEnvStats};
pub use iterator::{CacheHit, CacheIterator};
pub use tuple_cache::TupleCache;

/// Identifier of a tuple cache inside its environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheId(pub(crate) u32);
