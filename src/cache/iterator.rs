//! Cache Iterator
//!
//! Cursor over one tuple cache. The cursor remembers the key of the last
//! yielded entry together with the tree version it saw; if the version moved
//! on in the meantime the stored entry id is no longer trusted and the next
//! step re-seeks from the remembered key.

use std::ops::Bound;
use std::sync::Arc;

use crate::key_def::{IteratorType, Key, KeyDef};
use crate::tuple::Tuple;

use super::entry::{CacheEntry, TreeKey};
use super::env::{CacheEnv, CacheTree};
use super::lru::EntryId;
use super::CacheId;

/// A tuple produced by a cache iterator
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub tuple: Arc<Tuple>,
    /// No value exists between this tuple and the previous one of the same
    /// iterator (or the search start, for the first tuple)
    pub chained: bool,
}

enum State {
    Unopened,
    Positioned {
        key: TreeKey,
        entry: EntryId,
        version: u64,
    },
    Exhausted,
}

/// Iterator over a tuple cache
pub struct CacheIterator {
    env: CacheEnv,
    cache: CacheId,
    iterator_type: IteratorType,
    key: Key,
    key_level: u8,
    vlsn: i64,
    state: State,
    /// Set when the iterator is exhausted and the cache proves there is
    /// nothing more to find
    end_confirmed: bool,
    /// Number of times the cursor had to re-seek after a version change
    restores: u64,
}

impl CacheIterator {
    pub(crate) fn new(
        env: CacheEnv,
        cache: CacheId,
        key_def: &KeyDef,
        iterator_type: IteratorType,
        key: Key,
        vlsn: i64,
    ) -> Self {
        let iterator_type = iterator_type.normalize(&key);
        let key_level = key.part_count(key_def);
        Self {
            env,
            cache,
            iterator_type,
            key,
            key_level,
            vlsn,
            state: State::Unopened,
            end_confirmed: false,
            restores: 0,
        }
    }

    /// Iterator type after normalization
    pub fn iterator_type(&self) -> IteratorType {
        self.iterator_type
    }

    /// True once the iterator is exhausted and the cache proves the result
    /// set ends at the last yielded tuple
    pub fn end_confirmed(&self) -> bool {
        self.end_confirmed
    }

    /// Number of re-seeks caused by concurrent cache changes
    pub fn restores(&self) -> u64 {
        self.restores
    }

    fn direction(&self) -> i8 {
        self.iterator_type.direction()
    }

    /// EQ search, or a search without key (EQ with zero parts)
    fn is_eq(&self) -> bool {
        self.iterator_type.is_equality() || self.key_level == 0
    }

    /// First candidate of a fresh search
    fn seek(&self, tree: &CacheTree) -> Option<(TreeKey, EntryId)> {
        let found = match self.iterator_type {
            IteratorType::Eq | IteratorType::Ge | IteratorType::All => {
                tree.tree.range(TreeKey::before(&self.key)..).next()
            }
            IteratorType::Gt => tree
                .tree
                .range((Bound::Excluded(TreeKey::after(&self.key)), Bound::Unbounded))
                .next(),
            IteratorType::Req | IteratorType::Le => {
                tree.tree.range(..TreeKey::after(&self.key)).next_back()
            }
            IteratorType::Lt => tree.tree.range(..TreeKey::before(&self.key)).next_back(),
        };
        found.map(|(k, &id)| (k.clone(), id))
    }

    fn in_range(&self, key: &TreeKey) -> bool {
        !self.iterator_type.is_equality() || key.starts_with(&self.key)
    }

    /// Entry proves nothing lies between it and the search start
    fn is_first_stop(&self, entry: &CacheEntry) -> bool {
        let back = -self.direction();
        entry.is_linked(CacheEntry::link_flag(back))
            || (self.is_eq() && entry.boundary_level(back) <= self.key_level)
    }

    /// Entry proves nothing lies after it within the search
    fn is_end_stop(&self, entry: &CacheEntry) -> bool {
        let level = if self.is_eq() { self.key_level } else { 0 };
        entry.boundary_level(self.direction()) <= level
    }

    fn finish(&mut self, end_confirmed: bool) -> Option<CacheHit> {
        self.end_confirmed = end_confirmed;
        self.state = State::Exhausted;
        None
    }
}

impl Iterator for CacheIterator {
    type Item = CacheHit;

    fn next(&mut self) -> Option<CacheHit> {
        let env = self.env.clone();
        let mut state = env.lock();
        let direction = self.direction();

        let (mut candidate, last, restored) = {
            let Some(tree) = state.trees.get(&self.cache) else {
                return self.finish(false);
            };
            match &self.state {
                State::Exhausted => return None,
                State::Unopened => (self.seek(tree), None, false),
                State::Positioned {
                    key,
                    entry,
                    version,
                } => {
                    let trusted = if *version == tree.version {
                        state.arena.get(*entry).map(|e| e.key.clone())
                    } else {
                        None
                    };
                    let restored = trusted.is_none();
                    let from = trusted.unwrap_or_else(|| key.clone());
                    let next = tree
                        .neighbor(&from, direction)
                        .map(|(k, id)| (k.clone(), id));
                    (next, Some(from), restored)
                }
            }
        };
        if restored {
            self.restores += 1;
        }

        // Last yielded entry, if it is still cached
        let last_entry = last
            .as_ref()
            .and_then(|k| state.trees.get(&self.cache)?.tree.get(k).copied());
        let mut chained = true;
        loop {
            let Some((key, entry_id)) = candidate.take() else {
                // Ran off the end of the tree
                let confirmed = chained
                    && last_entry
                        .and_then(|id| state.arena.get(id))
                        .map_or(false, |e| self.is_end_stop(e));
                return self.finish(confirmed);
            };
            let Some(entry) = state.arena.get(entry_id) else {
                return self.finish(false);
            };
            if !self.in_range(&key) {
                // The first entry past the range is linked back to the last
                // result, or the last result is a proven boundary
                let confirmed = chained
                    && last.is_some()
                    && (entry.is_linked(CacheEntry::link_flag(-direction))
                        || last_entry
                            .and_then(|id| state.arena.get(id))
                            .map_or(false, |e| self.is_end_stop(e)));
                return self.finish(confirmed);
            }
            if entry.tuple.lsn() > self.vlsn {
                // Invisible to this reader; the gap is no longer proven
                chained = false;
                candidate = state
                    .trees
                    .get(&self.cache)
                    .and_then(|t| t.neighbor(&key, direction))
                    .map(|(k, id)| (k.clone(), id));
                continue;
            }

            let hit_chained = chained
                && if last.is_none() {
                    self.is_first_stop(entry)
                } else {
                    entry.is_linked(CacheEntry::link_flag(-direction))
                };
            let tuple = Arc::clone(&entry.tuple);
            state.arena.touch(entry_id);
            let version = state
                .trees
                .get(&self.cache)
                .map(|t| t.version)
                .unwrap_or(0);
            self.state = State::Positioned {
                key,
                entry: entry_id,
                version,
            };
            return Some(CacheHit {
                tuple,
                chained: hit_chained,
            });
        }
    }
}
