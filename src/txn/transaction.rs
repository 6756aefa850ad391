//! Transactions
//!
//! A transaction owns its statements, remembers which of them are still
//! open (innermost last) and in which order their redo rows were produced.
//! It is bound to at most one storage engine, chosen by its first
//! statement.

use std::fmt;
use std::sync::Arc;

use crate::engine::StorageEngine;
use crate::error::{CellarError, Result};
use crate::trigger::{TriggerList, TxnTrigger};
use crate::wal::RedoRow;

use super::statement::{Statement, StatementId};

/// Identifiers of an externally coordinated transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoPhaseIds {
    pub tx_id: u64,
    pub coordinator_id: u32,
}

pub struct Transaction {
    id: u64,
    // ---- Statements ----
    statements: Vec<Statement>,
    /// Open statements, innermost last
    open: Vec<usize>,
    /// Statements holding a redo row, in statement commit order
    redo_order: Vec<usize>,

    // ---- Flags ----
    is_autocommit: bool,
    two_phase: Option<TwoPhaseIds>,
    in_prepare: bool,

    engine: Option<Arc<dyn StorageEngine>>,

    // ---- Triggers ----
    has_triggers: bool,
    on_commit: TriggerList<TxnTrigger>,
    on_rollback: TriggerList<TxnTrigger>,
}

impl Transaction {
    pub(crate) fn new(id: u64, is_autocommit: bool, two_phase: Option<TwoPhaseIds>) -> Self {
        Self {
            id,
            statements: Vec::new(),
            open: Vec::new(),
            redo_order: Vec::new(),
            is_autocommit,
            two_phase,
            in_prepare: false,
            engine: None,
            has_triggers: false,
            on_commit: TriggerList::new(),
            on_rollback: TriggerList::new(),
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_autocommit(&self) -> bool {
        self.is_autocommit
    }

    pub fn is_two_phase(&self) -> bool {
        self.two_phase.is_some()
    }

    pub fn two_phase_ids(&self) -> Option<TwoPhaseIds> {
        self.two_phase
    }

    pub fn in_prepare(&self) -> bool {
        self.in_prepare
    }

    pub(crate) fn set_prepared(&mut self) {
        self.in_prepare = true;
    }

    /// Nesting depth of open statements
    pub fn in_sub_stmt(&self) -> usize {
        self.open.len()
    }

    /// Number of redo rows the transaction will write
    pub fn n_rows(&self) -> usize {
        self.redo_order.len()
    }

    pub fn engine(&self) -> Option<&Arc<dyn StorageEngine>> {
        self.engine.as_ref()
    }

    /// Bind the engine of the first statement; later statements must use
    /// the same one
    pub(crate) fn bind_engine(&mut self, engine: &Arc<dyn StorageEngine>) -> Result<()> {
        if let Some(bound) = &self.engine {
            if std::ptr::addr_eq(Arc::as_ptr(bound), Arc::as_ptr(engine)) {
                return Ok(());
            }
            return Err(CellarError::CrossEngineTransaction);
        }
        debug_assert!(self.statements.is_empty());
        engine.begin(self)?;
        self.engine = Some(Arc::clone(engine));
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(id.0)
    }

    pub fn statement_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.statements.get_mut(id.0)
    }

    /// Innermost open statement
    pub fn current_statement_id(&self) -> Option<StatementId> {
        self.open.last().map(|&i| StatementId(i))
    }

    pub fn current_statement(&self) -> Option<&Statement> {
        self.open.last().and_then(|&i| self.statements.get(i))
    }

    pub fn current_statement_mut(&mut self) -> Option<&mut Statement> {
        let index = *self.open.last()?;
        self.statements.get_mut(index)
    }

    pub(crate) fn push_statement(&mut self, statement: Statement) -> StatementId {
        let index = self.statements.len();
        self.statements.push(statement);
        self.open.push(index);
        StatementId(index)
    }

    /// Forget a statement whose engine hook failed
    pub(crate) fn pop_statement(&mut self, id: StatementId) {
        if self.open.last() == Some(&id.0) && self.statements.len() == id.0 + 1 {
            self.open.pop();
            self.statements.pop();
        }
    }

    pub(crate) fn attach_row(&mut self, id: StatementId, row: RedoRow) {
        if let Some(statement) = self.statements.get_mut(id.0) {
            statement.set_row(row);
            if !self.redo_order.contains(&id.0) {
                self.redo_order.push(id.0);
            }
        }
    }

    /// Close the innermost open statement
    pub(crate) fn close_statement(&mut self, id: StatementId) -> Result<()> {
        if self.open.last() != Some(&id.0) {
            return Err(CellarError::IllegalParams(format!(
                "statement {} is not the innermost open statement",
                id
            )));
        }
        self.open.pop();
        Ok(())
    }

    /// Drop a statement together with everything that ran after it
    pub(crate) fn truncate_statements(&mut self, id: StatementId) {
        self.statements.truncate(id.0);
        self.open.retain(|&i| i < id.0);
        self.redo_order.retain(|&i| i < id.0);
    }

    /// Redo row number `n` in commit order
    pub(crate) fn redo_row_mut(&mut self, n: usize) -> Option<&mut RedoRow> {
        let index = *self.redo_order.get(n)?;
        self.statements.get_mut(index)?.row_mut()
    }

    /// Redo rows in commit order
    pub fn redo_rows(&self) -> impl Iterator<Item = &RedoRow> + '_ {
        self.redo_order
            .iter()
            .filter_map(|&i| self.statements.get(i).and_then(Statement::row))
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    pub fn has_triggers(&self) -> bool {
        self.has_triggers
    }

    /// Run `trigger` once the transaction is committed
    pub fn on_commit(&mut self, trigger: impl FnMut(&Transaction) + Send + 'static) {
        self.on_commit.push(Box::new(trigger));
        self.has_triggers = true;
    }

    /// Run `trigger` if the transaction is rolled back
    pub fn on_rollback(&mut self, trigger: impl FnMut(&Transaction) + Send + 'static) {
        self.on_rollback.push(Box::new(trigger));
        self.has_triggers = true;
    }

    pub(crate) fn run_commit_triggers(&mut self) {
        if !self.has_triggers {
            return;
        }
        let mut triggers = self.on_commit.take();
        self.on_rollback.clear();
        for trigger in triggers.iter_mut() {
            trigger(self);
        }
    }

    pub(crate) fn run_rollback_triggers(&mut self) {
        if !self.has_triggers {
            return;
        }
        let mut triggers = self.on_rollback.take();
        self.on_commit.clear();
        for trigger in triggers.iter_mut() {
            trigger(self);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("statements", &self.statements.len())
            .field("in_sub_stmt", &self.open.len())
            .field("n_rows", &self.redo_order.len())
            .field("is_autocommit", &self.is_autocommit)
            .field("two_phase", &self.two_phase)
            .field("in_prepare", &self.in_prepare)
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}
