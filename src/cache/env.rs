//! Cache Environment
//!
//! State shared by every tuple cache: the entry arena, the common LRU list,
//! the memory quota and the per-index trees. Everything lives behind one
//! mutex, so a cache mutation updates the tree and the LRU list in a single
//! critical section and can never be observed half-done.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::key_def::KeyDef;
use crate::tuple::Tuple;

use super::entry::{CacheEntry, TreeKey, LEFT_LINKED, RIGHT_LINKED};
use super::lru::{EntryArena, EntryId};
use super::CacheId;

/// Snapshot of environment counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEnvStats {
    /// Number of cached tuples across all caches
    pub entries: usize,
    /// Bytes accounted to cached tuples
    pub mem_used: usize,
    /// Byte quota
    pub mem_quota: usize,
    /// Number of live tuple caches
    pub caches: usize,
}

/// Common environment of all tuple caches
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct CacheEnv {
    state: Arc<Mutex<EnvState>>,
}

impl CacheEnv {
    /// Create an environment with a memory quota in bytes
    pub fn new(mem_quota: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(EnvState::new(mem_quota))),
        }
    }

    /// Change the quota; evicts immediately if the new quota is exceeded
    pub fn set_quota(&self, mem_quota: usize) {
        let mut state = self.state.lock();
        state.mem_quota = mem_quota;
        state.gc();
    }

    pub fn stats(&self) -> CacheEnvStats {
        let state = self.state.lock();
        CacheEnvStats {
            entries: state.arena.len(),
            mem_used: state.mem_used,
            mem_quota: state.mem_quota,
            caches: state.trees.len(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EnvState> {
        self.state.lock()
    }
}

/// Ordered index of one tuple cache
pub(crate) struct CacheTree {
    pub key_def: KeyDef,
    pub tree: BTreeMap<TreeKey, EntryId>,
    /// Bumped on every change of the tree or of entry links
    pub version: u64,
}

impl CacheTree {
    /// Entry next to `key` in `direction` (+1 right, -1 left)
    pub fn neighbor(&self, key: &TreeKey, direction: i8) -> Option<(&TreeKey, EntryId)> {
        let found = if direction > 0 {
            self.tree
                .range((Bound::Excluded(key.clone()), Bound::Unbounded))
                .next()
        } else {
            self.tree.range(..key.clone()).next_back()
        };
        found.map(|(k, &id)| (k, id))
    }
}

pub(crate) struct EnvState {
    pub arena: EntryArena,
    pub trees: HashMap<CacheId, CacheTree>,
    next_cache_id: u32,
    pub mem_quota: usize,
    pub mem_used: usize,
}

impl EnvState {
    fn new(mem_quota: usize) -> Self {
        Self {
            arena: EntryArena::new(),
            trees: HashMap::new(),
            next_cache_id: 0,
            mem_quota,
            mem_used: 0,
        }
    }

    pub fn create_cache(&mut self, key_def: KeyDef) -> CacheId {
        let id = CacheId(self.next_cache_id);
        self.next_cache_id += 1;
        self.trees.insert(
            id,
            CacheTree {
                key_def,
                tree: BTreeMap::new(),
                version: 0,
            },
        );
        id
    }

    /// Drop a cache and release all of its entries
    pub fn destroy_cache(&mut self, id: CacheId) {
        if let Some(tree) = self.trees.remove(&id) {
            for entry_id in tree.tree.into_values() {
                self.free_entry(entry_id);
            }
        }
    }

    /// Find the entry for `tuple` or insert a fresh one; returns its id
    pub fn find_or_insert(&mut self, id: CacheId, tuple: &Arc<Tuple>) -> Option<EntryId> {
        let tree = self.trees.get(&id)?;
        let key = TreeKey::exact(tree.key_def.extract_key(tuple).into_parts());
        if let Some(&existing) = tree.tree.get(&key) {
            self.arena.touch(existing);
            return Some(existing);
        }
        let part_count = tree.key_def.part_count();
        let entry = CacheEntry::new(id, Arc::clone(tuple), key.clone(), part_count);
        self.mem_used += entry.size;
        let entry_id = self.arena.insert(entry);
        let tree = self.trees.get_mut(&id)?;
        tree.tree.insert(key, entry_id);
        tree.version += 1;
        Some(entry_id)
    }

    /// Unlink an entry from its tree neighbors, remove it from the tree
    /// and free it
    pub fn remove_entry(&mut self, entry_id: EntryId) -> Option<Arc<Tuple>> {
        let (cache, key, flags) = {
            let entry = self.arena.get(entry_id)?;
            (entry.cache, entry.key.clone(), entry.flags)
        };
        if let Some(tree) = self.trees.get(&cache) {
            let left = tree.neighbor(&key, -1).map(|(_, id)| id);
            let right = tree.neighbor(&key, 1).map(|(_, id)| id);
            if flags & LEFT_LINKED != 0 {
                if let Some(e) = left.and_then(|id| self.arena.get_mut(id)) {
                    e.flags &= !RIGHT_LINKED;
                }
            }
            if flags & RIGHT_LINKED != 0 {
                if let Some(e) = right.and_then(|id| self.arena.get_mut(id)) {
                    e.flags &= !LEFT_LINKED;
                }
            }
        }
        if let Some(tree) = self.trees.get_mut(&cache) {
            tree.tree.remove(&key);
            tree.version += 1;
        }
        self.free_entry(entry_id)
    }

    /// Evict least recently used entries until the quota holds
    pub fn gc(&mut self) {
        let mut evicted = 0usize;
        while self.mem_used > self.mem_quota {
            let Some(tail) = self.arena.tail() else {
                break;
            };
            self.remove_entry(tail);
            evicted += 1;
        }
        if evicted > 0 {
            tracing::trace!(
                evicted,
                mem_used = self.mem_used,
                mem_quota = self.mem_quota,
                "tuple cache eviction"
            );
        }
    }

    fn free_entry(&mut self, entry_id: EntryId) -> Option<Arc<Tuple>> {
        let entry = self.arena.remove(entry_id)?;
        self.mem_used = self.mem_used.saturating_sub(entry.size);
        Some(entry.tuple)
    }
}
