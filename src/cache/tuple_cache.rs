//! Tuple Cache
//!
//! Ordered cache of recently read tuples of one index. Besides the tuples
//! themselves the cache remembers what readers proved about the gaps
//! between them: link flags say two neighbors were read consecutively, and
//! boundary levels say an entry was the first or last match of an equality
//! search. Both let a later search finish without asking the engine.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::key_def::{IteratorType, Key, KeyDef};
use crate::tuple::Tuple;

use super::entry::{CacheEntry, TreeKey, LEFT_LINKED, RIGHT_LINKED};
use super::env::{CacheEnv, EnvState};
use super::iterator::CacheIterator;
use super::lru::EntryId;
use super::CacheId;

/// Cache of one index, registered in a shared `CacheEnv`
pub struct TupleCache {
    env: CacheEnv,
    id: CacheId,
    key_def: KeyDef,
}

impl TupleCache {
    /// Create an empty cache for an index with the given key definition
    pub fn new(env: &CacheEnv, key_def: KeyDef) -> Self {
        let id = env.lock().create_cache(key_def.clone());
        Self {
            env: env.clone(),
            id,
            key_def,
        }
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    pub fn env(&self) -> &CacheEnv {
        &self.env
    }

    /// Structural version; changes on every tree or link mutation
    pub fn version(&self) -> u64 {
        self.env
            .lock()
            .trees
            .get(&self.id)
            .map(|t| t.version)
            .unwrap_or(0)
    }

    /// Number of cached tuples
    pub fn len(&self) -> usize {
        self.env
            .lock()
            .trees
            .get(&self.id)
            .map(|t| t.tree.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record the result of a read.
    ///
    /// `tuple` is what the reader got, `prev` what the same reader got just
    /// before it in `order` direction (`None` at the start of the search).
    /// `tuple == None` marks the end of the search after `prev`.
    ///
    /// Must only be called by readers of the latest committed state.
    pub fn add(
        &self,
        tuple: Option<&Arc<Tuple>>,
        prev: Option<&Arc<Tuple>>,
        key: &Key,
        order: IteratorType,
    ) {
        let mut state = self.env.lock();
        if state.mem_quota == 0 {
            return;
        }
        if tuple.map_or(false, |t| t.is_uncommitted()) {
            return;
        }

        // First or last result of the search
        let is_boundary = tuple.is_some() != prev.is_some();
        let prev = prev.filter(|p| !p.is_uncommitted());

        let part_count = self.key_def.part_count();
        let key_level = key.part_count(&self.key_def);
        let mut direction = order.direction();
        let mut boundary_level = part_count;

        let (tuple, prev) = match (tuple, prev) {
            (None, None) => return,
            (Some(t), p) => {
                if is_boundary {
                    boundary_level = key_level;
                }
                (t, p)
            }
            (None, Some(p)) => {
                // End of the search: `p` is the first result of the same
                // search in the opposite direction.
                boundary_level = if order.is_equality() { key_level } else { 0 };
                direction = -direction;
                (p, None)
            }
        };

        let Some(entry_id) = state.find_or_insert(self.id, tuple) else {
            return;
        };
        if let Some(entry) = state.arena.get_mut(entry_id) {
            if direction > 0 && boundary_level < entry.left_boundary_level {
                entry.left_boundary_level = boundary_level;
            } else if direction < 0 && boundary_level < entry.right_boundary_level {
                entry.right_boundary_level = boundary_level;
            }
        }
        if let Some(tree) = state.trees.get_mut(&self.id) {
            tree.version += 1;
        }
        tracing::trace!(cache = self.id.0, %tuple, boundary_level, "tuple cache add");

        if let Some(prev) = prev {
            self.link_prev(&mut state, entry_id, prev, direction);
        }
        state.gc();
    }

    /// Link `entry_id` with the tuple read just before it
    fn link_prev(&self, state: &mut EnvState, entry_id: EntryId, prev: &Arc<Tuple>, direction: i8) {
        // Flag of the new entry pointing back at prev
        let flag = CacheEntry::link_flag(-direction);
        let (entry_key, entry_tuple) = match state.arena.get(entry_id) {
            Some(e) if !e.is_linked(flag) => (e.key.clone(), Arc::clone(&e.tuple)),
            _ => return,
        };
        let expected = if direction > 0 {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        if self.key_def.compare(prev, &entry_tuple) != expected {
            return;
        }

        let Some(prev_id) = state.find_or_insert(self.id, prev) else {
            return;
        };
        // Only tree neighbors can be linked
        let adjacent = state
            .trees
            .get(&self.id)
            .and_then(|t| t.neighbor(&entry_key, -direction))
            .map_or(false, |(_, id)| id == prev_id);
        if !adjacent {
            return;
        }

        if let Some(entry) = state.arena.get_mut(entry_id) {
            entry.flags |= flag;
        }
        if let Some(prev_entry) = state.arena.get_mut(prev_id) {
            prev_entry.flags |= (LEFT_LINKED | RIGHT_LINKED) ^ flag;
        }
        if let Some(tree) = state.trees.get_mut(&self.id) {
            tree.version += 1;
        }
    }

    /// Forget what the cache knows about `tuple` after it was overwritten
    /// or deleted.
    ///
    /// Removes the cached tuple with the same key, if any, and drops every
    /// guarantee its neighbors give about the gap the write touched.
    /// Returns the removed tuple.
    pub fn invalidate(&self, tuple: &Tuple) -> Option<Arc<Tuple>> {
        let mut state = self.env.lock();
        let part_count = self.key_def.part_count();
        let key = TreeKey::exact(self.key_def.extract_key(tuple).into_parts());

        let (exact, left, right) = {
            let tree = state.trees.get(&self.id)?;
            let exact = tree.tree.get(&key).copied();
            let left = tree.neighbor(&key, -1).map(|(_, id)| id);
            let right = tree.neighbor(&key, 1).map(|(_, id)| id);
            (exact, left, right)
        };
        if exact.is_none() && left.is_none() && right.is_none() {
            return None;
        }

        if let Some(e) = left.and_then(|id| state.arena.get_mut(id)) {
            e.flags &= !RIGHT_LINKED;
            e.right_boundary_level = part_count;
        }
        if let Some(e) = right.and_then(|id| state.arena.get_mut(id)) {
            e.flags &= !LEFT_LINKED;
            e.left_boundary_level = part_count;
        }
        if let Some(tree) = state.trees.get_mut(&self.id) {
            tree.version += 1;
        }

        let removed = exact.and_then(|id| state.remove_entry(id));
        if removed.is_some() {
            tracing::trace!(cache = self.id.0, %tuple, "tuple cache invalidate");
        }
        removed
    }

    /// Point lookup by full key
    pub fn get(&self, key: &Key) -> Option<Arc<Tuple>> {
        if key.len() != self.key_def.part_count() as usize {
            return None;
        }
        let mut state = self.env.lock();
        let tree_key = TreeKey::exact(key.parts().to_vec());
        let entry_id = *state.trees.get(&self.id)?.tree.get(&tree_key)?;
        state.arena.touch(entry_id);
        state.arena.get(entry_id).map(|e| Arc::clone(&e.tuple))
    }

    /// Open an iterator over the cache.
    ///
    /// The iterator shows tuples with `lsn <= vlsn` only.
    pub fn iter(&self, iterator_type: IteratorType, key: Key, vlsn: i64) -> CacheIterator {
        CacheIterator::new(
            self.env.clone(),
            self.id,
            &self.key_def,
            iterator_type,
            key,
            vlsn,
        )
    }

    /// Boundary levels of the cached tuple with this full key
    pub fn boundary_levels(&self, key: &Key) -> Option<(u8, u8)> {
        let state = self.env.lock();
        let tree_key = TreeKey::exact(key.parts().to_vec());
        let entry_id = *state.trees.get(&self.id)?.tree.get(&tree_key)?;
        state
            .arena
            .get(entry_id)
            .map(|e| (e.left_boundary_level, e.right_boundary_level))
    }

    /// Link flags of the cached tuple with this full key: (left, right)
    pub fn links(&self, key: &Key) -> Option<(bool, bool)> {
        let state = self.env.lock();
        let tree_key = TreeKey::exact(key.parts().to_vec());
        let entry_id = *state.trees.get(&self.id)?.tree.get(&tree_key)?;
        state
            .arena
            .get(entry_id)
            .map(|e| (e.is_linked(LEFT_LINKED), e.is_linked(RIGHT_LINKED)))
    }
}

impl Drop for TupleCache {
    fn drop(&mut self) {
        self.env.lock().destroy_cache(self.id);
    }
}
