//! Trigger lists
//!
//! Ordered callback lists. Replace triggers belong to a space and run when a
//! statement against it completes; they get the session so they can run
//! nested statements of their own. Commit and rollback triggers belong to a
//! transaction and must not fail.

use std::sync::Arc;

use crate::error::Result;
use crate::txn::{Session, StatementId, Transaction};

/// Runs when a statement on the space completes. An error fails the
/// statement.
pub type ReplaceTrigger = Arc<dyn Fn(&mut Session, StatementId) -> Result<()> + Send + Sync>;

/// Runs once when the transaction commits or rolls back
pub type TxnTrigger = Box<dyn FnMut(&Transaction) + Send>;

/// Callbacks in registration order
pub struct TriggerList<T> {
    triggers: Vec<T>,
}

impl<T> TriggerList<T> {
    pub fn new() -> Self {
        Self {
            triggers: Vec::new(),
        }
    }

    pub fn push(&mut self, trigger: T) {
        self.triggers.push(trigger);
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
    }

    /// Take the callbacks out, leaving the list empty
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.triggers)
    }
}

impl<T: Clone> TriggerList<T> {
    /// Copy of the list, so triggers can run without holding a lock on it
    pub fn snapshot(&self) -> Vec<T> {
        self.triggers.clone()
    }
}

impl<T> Default for TriggerList<T> {
    fn default() -> Self {
        Self::new()
    }
}
