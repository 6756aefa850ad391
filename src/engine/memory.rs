//! In-memory storage engine
//!
//! Reference `StorageEngine`: an ordered row store per space, a write set
//! per transaction, optimistic conflict detection at prepare, and a tuple
//! cache in front of every space.
//!
//! ## Concurrency Model
//! - **Writes** are buffered in the transaction's write set and reach the
//!   row store only in `commit`, under the `spaces` write lock
//! - **Reads** take the `spaces` read lock; the cache environment has its
//!   own lock, always taken after `spaces`
//! - Lock order: `spaces` → `write_sets` → cache environment
//! - **Conflicts**: every write remembers the committed tuple it replaced;
//!   `prepare` fails if that tuple is no longer current

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::{CacheEnv, TreeKey, TupleCache};
use crate::error::{CellarError, Result};
use crate::key_def::{IteratorType, Key, KeyDef};
use crate::space::Space;
use crate::tuple::Tuple;
use crate::txn::{StatementId, Transaction};

use super::{Savepoint, StorageEngine};

/// Read view of the latest committed state
pub const LATEST_VLSN: i64 = i64::MAX;

/// Counters of a `MemoryEngine`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEngineStats {
    pub cache_hits: u64,
    pub store_reads: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    store_reads: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    conflicts: AtomicU64,
}

struct SpaceStore {
    key_def: KeyDef,
    rows: BTreeMap<TreeKey, Arc<Tuple>>,
    cache: TupleCache,
}

struct WriteOp {
    space_id: u32,
    key: TreeKey,
    new: Option<Arc<Tuple>>,
    /// Committed tuple seen by the first write of this key in the
    /// transaction; `None` for later writes of the same key
    observed: Option<Option<Arc<Tuple>>>,
}

#[derive(Default)]
struct WriteSet {
    ops: Vec<WriteOp>,
}

pub struct MemoryEngine {
    name: String,
    cache_env: CacheEnv,
    spaces: RwLock<HashMap<u32, SpaceStore>>,
    write_sets: Mutex<HashMap<u64, WriteSet>>,
    /// LSN of the last commit with a signature
    last_lsn: AtomicI64,
    counters: Counters,
}

impl MemoryEngine {
    pub fn new(name: impl Into<String>, cache_env: CacheEnv) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            cache_env,
            spaces: RwLock::new(HashMap::new()),
            write_sets: Mutex::new(HashMap::new()),
            last_lsn: AtomicI64::new(0),
            counters: Counters::default(),
        })
    }

    /// Register a space stored by this engine
    pub fn create_space(
        self: &Arc<Self>,
        id: u32,
        name: &str,
        key_def: KeyDef,
        temporary: bool,
    ) -> Result<Arc<Space>> {
        let mut spaces = self.spaces.write();
        if spaces.contains_key(&id) {
            return Err(CellarError::IllegalParams(format!(
                "space {} already exists",
                id
            )));
        }
        spaces.insert(
            id,
            SpaceStore {
                key_def: key_def.clone(),
                rows: BTreeMap::new(),
                cache: TupleCache::new(&self.cache_env, key_def.clone()),
            },
        );
        tracing::debug!(engine = %self.name, space = id, name, temporary, "space created");
        let engine: Arc<dyn StorageEngine> = Arc::clone(self) as Arc<dyn StorageEngine>;
        Ok(Arc::new(Space::new(id, name, key_def, temporary, engine)))
    }

    pub fn cache_env(&self) -> &CacheEnv {
        &self.cache_env
    }

    pub fn stats(&self) -> MemoryEngineStats {
        MemoryEngineStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            store_reads: self.counters.store_reads.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Number of committed rows in a space
    pub fn len(&self, space_id: u32) -> Result<usize> {
        let spaces = self.spaces.read();
        let store = spaces
            .get(&space_id)
            .ok_or(CellarError::NoSuchSpace(space_id))?;
        Ok(store.rows.len())
    }

    /// Number of tuples in the cache of a space
    pub fn cached_len(&self, space_id: u32) -> Result<usize> {
        let spaces = self.spaces.read();
        let store = spaces
            .get(&space_id)
            .ok_or(CellarError::NoSuchSpace(space_id))?;
        Ok(store.cache.len())
    }

    // =========================================================================
    // DML (inside an open statement)
    // =========================================================================

    /// Insert a tuple; fails if the key exists
    pub fn insert(&self, txn: &mut Transaction, space: &Space, tuple: Tuple) -> Result<()> {
        self.write(txn, space, WriteKind::Insert(tuple)).map(|_| ())
    }

    /// Insert or overwrite a tuple, returning the replaced one
    pub fn replace(
        &self,
        txn: &mut Transaction,
        space: &Space,
        tuple: Tuple,
    ) -> Result<Option<Arc<Tuple>>> {
        self.write(txn, space, WriteKind::Replace(tuple))
    }

    /// Delete by full key, returning the deleted tuple
    pub fn delete(
        &self,
        txn: &mut Transaction,
        space: &Space,
        key: &Key,
    ) -> Result<Option<Arc<Tuple>>> {
        self.write(txn, space, WriteKind::Delete(key.clone()))
    }

    /// Point lookup by full key. With a transaction, its own writes are
    /// visible.
    pub fn get(
        &self,
        txn: Option<&Transaction>,
        space_id: u32,
        key: &Key,
    ) -> Result<Option<Arc<Tuple>>> {
        let tree_key = TreeKey::exact(key.parts().to_vec());
        if let Some(txn) = txn {
            let write_sets = self.write_sets.lock();
            if let Some(op) = write_sets
                .get(&txn.id())
                .and_then(|ws| find_write(ws, space_id, &tree_key))
            {
                return Ok(op.new.clone());
            }
        }
        let spaces = self.spaces.read();
        let store = spaces
            .get(&space_id)
            .ok_or(CellarError::NoSuchSpace(space_id))?;
        Ok(store.rows.get(&tree_key).cloned())
    }

    fn write(
        &self,
        txn: &mut Transaction,
        space: &Space,
        kind: WriteKind,
    ) -> Result<Option<Arc<Tuple>>> {
        match txn.current_statement() {
            Some(stmt) if stmt.space().id() == space.id() => {}
            Some(stmt) => {
                return Err(CellarError::IllegalParams(format!(
                    "open statement is on space {}, not {}",
                    stmt.space().id(),
                    space.id()
                )))
            }
            None => return Err(CellarError::IllegalParams("no open statement".to_string())),
        }

        let spaces = self.spaces.read();
        let store = spaces
            .get(&space.id())
            .ok_or(CellarError::NoSuchSpace(space.id()))?;

        let (key, new) = match kind {
            WriteKind::Insert(tuple) | WriteKind::Replace(tuple)
                if !store.key_def.covers(&tuple) =>
            {
                return Err(CellarError::IllegalParams(format!(
                    "tuple {} does not cover the primary key",
                    tuple
                )));
            }
            WriteKind::Insert(tuple) => {
                let key = TreeKey::exact(store.key_def.extract_key(&tuple).into_parts());
                (key, Some((Arc::new(tuple), true)))
            }
            WriteKind::Replace(tuple) => {
                let key = TreeKey::exact(store.key_def.extract_key(&tuple).into_parts());
                (key, Some((Arc::new(tuple), false)))
            }
            WriteKind::Delete(key) => {
                if key.len() != store.key_def.part_count() as usize {
                    return Err(CellarError::IllegalParams(
                        "delete needs a full key".to_string(),
                    ));
                }
                (TreeKey::exact(key.into_parts()), None)
            }
        };

        let mut write_sets = self.write_sets.lock();
        let ws = write_sets.get_mut(&txn.id()).ok_or_else(|| {
            CellarError::Engine(format!("transaction {} did not begin in {}", txn.id(), self.name))
        })?;

        // Latest version visible to this transaction
        let (current, observed) = match find_write(ws, space.id(), &key) {
            Some(op) => (op.new.clone(), None),
            None => {
                let committed = store.rows.get(&key).cloned();
                (committed.clone(), Some(committed))
            }
        };

        let new = match new {
            Some((_, true)) if current.is_some() => {
                return Err(CellarError::DuplicateKey(space.id()));
            }
            Some((tuple, _)) => Some(tuple),
            None if current.is_none() => return Ok(None),
            None => None,
        };

        ws.ops.push(WriteOp {
            space_id: space.id(),
            key,
            new: new.clone(),
            observed,
        });
        if let Some(stmt) = txn.current_statement_mut() {
            stmt.set_old_tuple(current.clone());
            stmt.set_new_tuple(new);
        }
        Ok(current)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Search a space.
    ///
    /// Served from the tuple cache when it proves the complete result;
    /// otherwise the row store is read and, for reads of the latest state,
    /// the result is added to the cache.
    pub fn select(
        &self,
        space_id: u32,
        iterator_type: IteratorType,
        key: &Key,
        vlsn: i64,
    ) -> Result<Vec<Arc<Tuple>>> {
        let spaces = self.spaces.read();
        let store = spaces
            .get(&space_id)
            .ok_or(CellarError::NoSuchSpace(space_id))?;

        if let Some(result) = store.from_cache(iterator_type, key, vlsn) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(result);
        }

        self.counters.store_reads.fetch_add(1, Ordering::Relaxed);
        let result = store.scan(iterator_type, key, vlsn);
        if vlsn == LATEST_VLSN {
            store.populate_cache(iterator_type, key, &result);
        }
        Ok(result)
    }

    fn check_conflicts(&self, txn: &Transaction) -> Result<()> {
        let spaces = self.spaces.read();
        let write_sets = self.write_sets.lock();
        let Some(ws) = write_sets.get(&txn.id()) else {
            return Ok(());
        };
        for op in &ws.ops {
            let Some(observed) = &op.observed else {
                continue;
            };
            let current = spaces.get(&op.space_id).and_then(|s| s.rows.get(&op.key));
            let unchanged = match (observed, current) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if !unchanged {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(txn = txn.id(), space = op.space_id, "write conflict");
                return Err(CellarError::Conflict);
            }
        }
        Ok(())
    }
}

enum WriteKind {
    Insert(Tuple),
    Replace(Tuple),
    Delete(Key),
}

fn find_write<'a>(ws: &'a WriteSet, space_id: u32, key: &TreeKey) -> Option<&'a WriteOp> {
    ws.ops
        .iter()
        .rev()
        .find(|op| op.space_id == space_id && op.key == *key)
}

impl SpaceStore {
    fn from_cache(&self, iterator_type: IteratorType, key: &Key, vlsn: i64) -> Option<Vec<Arc<Tuple>>> {
        if iterator_type.is_equality() && key.len() == self.key_def.part_count() as usize {
            return self
                .cache
                .get(key)
                .filter(|t| t.lsn() <= vlsn)
                .map(|t| vec![t]);
        }
        let mut iter = self.cache.iter(iterator_type, key.clone(), vlsn);
        let mut result = Vec::new();
        for hit in iter.by_ref() {
            if !hit.chained {
                return None;
            }
            result.push(hit.tuple);
        }
        iter.end_confirmed().then_some(result)
    }

    fn scan(&self, iterator_type: IteratorType, key: &Key, vlsn: i64) -> Vec<Arc<Tuple>> {
        let iterator_type = iterator_type.normalize(key);
        let rows: Box<dyn Iterator<Item = (&TreeKey, &Arc<Tuple>)> + '_> = match iterator_type {
            IteratorType::Eq | IteratorType::Ge | IteratorType::All => {
                Box::new(self.rows.range(TreeKey::before(key)..))
            }
            IteratorType::Gt => Box::new(
                self.rows
                    .range((Bound::Excluded(TreeKey::after(key)), Bound::Unbounded)),
            ),
            IteratorType::Req | IteratorType::Le => {
                Box::new(self.rows.range(..TreeKey::after(key)).rev())
            }
            IteratorType::Lt => Box::new(self.rows.range(..TreeKey::before(key)).rev()),
        };
        rows.take_while(|(_, t)| {
            !iterator_type.is_equality()
                || self.key_def.compare_with_key(t, key) == std::cmp::Ordering::Equal
        })
            .filter(|(_, t)| t.lsn() <= vlsn)
            .map(|(_, t)| Arc::clone(t))
            .collect()
    }

    fn populate_cache(&self, iterator_type: IteratorType, key: &Key, result: &[Arc<Tuple>]) {
        let order = iterator_type.normalize(key);
        let mut prev: Option<&Arc<Tuple>> = None;
        for tuple in result {
            self.cache.add(Some(tuple), prev, key, order);
            prev = Some(tuple);
        }
        self.cache.add(None, prev, key, order);
    }
}

impl StorageEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, txn: &mut Transaction) -> Result<()> {
        self.write_sets.lock().insert(txn.id(), WriteSet::default());
        Ok(())
    }

    fn begin_statement(&self, txn: &mut Transaction) -> Result<()> {
        let len = self
            .write_sets
            .lock()
            .get(&txn.id())
            .map(|ws| ws.ops.len())
            .unwrap_or(0);
        if let Some(stmt) = txn.current_statement_mut() {
            stmt.set_engine_savepoint(Savepoint(len as u64));
        }
        Ok(())
    }

    fn prepare(&self, txn: &mut Transaction) -> Result<()> {
        self.check_conflicts(txn)
    }

    fn prepare_two_phase(&self, txn: &mut Transaction) -> Result<()> {
        self.check_conflicts(txn)
    }

    fn commit(&self, txn: &mut Transaction, signature: i64) -> Result<()> {
        let Some(ws) = self.write_sets.lock().remove(&txn.id()) else {
            return Ok(());
        };
        let lsn = if signature >= 0 {
            self.last_lsn.fetch_max(signature, Ordering::AcqRel);
            signature
        } else {
            self.last_lsn.load(Ordering::Acquire)
        };

        let mut spaces = self.spaces.write();
        for op in ws.ops {
            let store = spaces
                .get_mut(&op.space_id)
                .ok_or(CellarError::NoSuchSpace(op.space_id))?;
            match op.new {
                Some(tuple) => {
                    let committed = tuple.committed(lsn);
                    store.cache.invalidate(&committed);
                    store.rows.insert(op.key, committed);
                }
                None => {
                    if let Some(old) = store.rows.remove(&op.key) {
                        store.cache.invalidate(&old);
                    }
                }
            }
        }
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(engine = %self.name, txn = txn.id(), lsn, "applied write set");
        Ok(())
    }

    fn rollback(&self, txn: &mut Transaction) {
        if self.write_sets.lock().remove(&txn.id()).is_some() {
            self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn rollback_statement(&self, txn: &mut Transaction, statement: StatementId) -> Result<()> {
        let Some(Savepoint(savepoint)) = txn
            .statement(statement)
            .and_then(|stmt| stmt.engine_savepoint())
        else {
            return Ok(());
        };
        if let Some(ws) = self.write_sets.lock().get_mut(&txn.id()) {
            ws.ops.truncate(savepoint as usize);
        }
        Ok(())
    }
}
