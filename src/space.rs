//! Spaces
//!
//! A space is the logical container statements write into. It knows its
//! primary key, the engine that stores it, and the replace triggers to run
//! after each statement.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::StorageEngine;
use crate::key_def::KeyDef;
use crate::trigger::{ReplaceTrigger, TriggerList};

pub struct Space {
    id: u32,
    name: String,
    /// Temporary spaces are never written to the WAL
    temporary: bool,
    key_def: KeyDef,
    engine: Arc<dyn StorageEngine>,
    on_replace: RwLock<TriggerList<ReplaceTrigger>>,
    run_triggers: AtomicBool,
}

impl Space {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        key_def: KeyDef,
        temporary: bool,
        engine: Arc<dyn StorageEngine>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            temporary,
            key_def,
            engine,
            on_replace: RwLock::new(TriggerList::new()),
            run_triggers: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Append a replace trigger
    pub fn on_replace(&self, trigger: ReplaceTrigger) {
        self.on_replace.write().push(trigger);
    }

    /// Enable or disable replace triggers (e.g. while applying replicated
    /// rows)
    pub fn set_run_triggers(&self, run: bool) {
        self.run_triggers.store(run, Ordering::Release);
    }

    pub fn run_triggers(&self) -> bool {
        self.run_triggers.load(Ordering::Acquire)
    }

    /// Replace triggers to run now, empty when disabled
    pub(crate) fn replace_triggers(&self) -> Vec<ReplaceTrigger> {
        if !self.run_triggers() {
            return Vec::new();
        }
        self.on_replace.read().snapshot()
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("temporary", &self.temporary)
            .field("engine", &self.engine.name())
            .finish()
    }
}
