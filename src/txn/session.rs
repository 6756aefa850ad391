//! Sessions
//!
//! A session is one execution context. It holds at most one active
//! transaction and drives it through its life:
//!
//! ```text
//!            begin / begin_statement (implicit, autocommit)
//!   NoTxn ──────────────────────────────────────────► Active ◄──┐
//!     ▲                                                 │  │    │ commit_statement /
//!     │                         begin_statement (<= 3)  │  └────┘ rollback_statement
//!     │                                                 ▼
//!     │                                           InSubStatement
//!     │                                                 │
//!     │   prepare_two_phase (two-phase only)            ▼
//!     │                                       Prepared ─► Committing ─► Committed
//!     │                                                        │
//!     └───────────────── rollback / WAL failure ───────────────┴─────► RolledBack
//! ```

use std::sync::Arc;

use crate::error::{CellarError, Result};
use crate::space::Space;
use crate::wal::{RedoRow, RowType};

use super::batch::flush_rows;
use super::env::TxnEnv;
use super::request::Request;
use super::statement::{Statement, StatementId};
use super::transaction::{Transaction, TwoPhaseIds};
use super::SUB_STMT_MAX;

pub struct Session {
    env: Arc<TxnEnv>,
    txn: Option<Transaction>,
}

impl Session {
    pub fn new(env: Arc<TxnEnv>) -> Self {
        Self { env, txn: None }
    }

    pub fn env(&self) -> &Arc<TxnEnv> {
        &self.env
    }

    /// Whether a transaction is bound to this session
    pub fn is_active(&self) -> bool {
        self.txn.is_some()
    }

    pub fn txn(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    pub fn txn_mut(&mut self) -> Option<&mut Transaction> {
        self.txn.as_mut()
    }

    // =========================================================================
    // Begin
    // =========================================================================

    /// Start a transaction. Fails if one is already active.
    pub fn begin(&mut self, autocommit: bool) -> Result<&mut Transaction> {
        if self.txn.is_some() {
            return Err(CellarError::ActiveTransaction);
        }
        Ok(self.start(autocommit, None))
    }

    /// Start an externally coordinated transaction; commit requires a
    /// prior `prepare_two_phase`
    pub fn begin_two_phase(&mut self, tx_id: u64, coordinator_id: u32) -> Result<&mut Transaction> {
        if self.txn.is_some() {
            return Err(CellarError::ActiveTransaction);
        }
        let ids = TwoPhaseIds {
            tx_id,
            coordinator_id,
        };
        Ok(self.start(false, Some(ids)))
    }

    fn start(&mut self, autocommit: bool, two_phase: Option<TwoPhaseIds>) -> &mut Transaction {
        let txn = Transaction::new(self.env.next_txn_id(), autocommit, two_phase);
        tracing::debug!(txn = txn.id(), autocommit, two_phase = two_phase.is_some(), "begin");
        self.txn.insert(txn)
    }

    /// Open a statement against `space`, starting an autocommit
    /// transaction if none is active
    pub fn begin_statement(&mut self, space: &Arc<Space>) -> Result<&mut Transaction> {
        let implicit = match &self.txn {
            None => true,
            Some(txn) => {
                if txn.in_sub_stmt() >= SUB_STMT_MAX {
                    return Err(CellarError::SubStatementMax);
                }
                if txn.in_prepare() {
                    return Err(CellarError::ChangePrepared);
                }
                false
            }
        };
        if implicit {
            self.start(true, None);
        }
        if let Err(e) = self.open_statement(space) {
            if implicit {
                if let Some(txn) = self.txn.take() {
                    self.rollback_txn(txn);
                }
            }
            return Err(e);
        }
        self.txn.as_mut().ok_or(CellarError::NoActiveTransaction)
    }

    fn open_statement(&mut self, space: &Arc<Space>) -> Result<()> {
        let txn = self.txn.as_mut().ok_or(CellarError::NoActiveTransaction)?;
        let engine = Arc::clone(space.engine());
        txn.bind_engine(&engine)?;
        let id = txn.push_statement(Statement::new(Arc::clone(space)));
        if let Err(e) = engine.begin_statement(txn) {
            txn.pop_statement(id);
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Statement completion
    // =========================================================================

    /// Close the innermost open statement.
    ///
    /// Captures the redo row of `request` (persistent spaces only) and runs
    /// the space's replace triggers. When the last open statement of an
    /// autocommit transaction closes, the transaction commits.
    pub fn commit_statement(&mut self, request: Option<&Request>) -> Result<()> {
        let txn = self.txn.as_mut().ok_or(CellarError::NoActiveTransaction)?;
        let id = txn
            .current_statement_id()
            .ok_or_else(|| CellarError::IllegalParams("no open statement".to_string()))?;
        let (space, has_images) = match txn.statement(id) {
            Some(stmt) => (Arc::clone(stmt.space()), stmt.has_images()),
            None => return Err(CellarError::IllegalParams("no open statement".to_string())),
        };

        if !space.is_temporary() {
            if let Some(request) = request {
                let row = request.to_redo_row()?;
                txn.attach_row(id, row);
            }
        }

        if has_images {
            for trigger in space.replace_triggers() {
                trigger(self, id)?;
            }
        }

        let txn = self.txn.as_mut().ok_or(CellarError::NoActiveTransaction)?;
        txn.close_statement(id)?;
        if txn.is_autocommit() && txn.in_sub_stmt() == 0 {
            return self.commit_txn();
        }
        Ok(())
    }

    /// Undo the innermost open statement. In an autocommit transaction the
    /// whole transaction is rolled back.
    pub fn rollback_statement(&mut self) -> Result<()> {
        let Some(txn) = self.txn.as_mut() else {
            return Ok(());
        };
        if txn.is_autocommit() {
            if let Some(txn) = self.txn.take() {
                self.rollback_txn(txn);
            }
            return Ok(());
        }
        let Some(id) = txn.current_statement_id() else {
            return Ok(());
        };
        if let Some(engine) = txn.engine().cloned() {
            engine.rollback_statement(txn, id)?;
        }
        // Nested statements ran inside this one and go with it
        txn.truncate_statements(id);
        tracing::trace!(txn = txn.id(), statement = %id, "statement rolled back");
        Ok(())
    }

    // =========================================================================
    // Two-phase
    // =========================================================================

    /// Prepare the active two-phase transaction described by `row`
    pub fn prepare_two_phase(&mut self, row: &RedoRow) -> Result<()> {
        let txn = self.txn.as_mut().ok_or(CellarError::NoActiveTransaction)?;
        if txn.in_prepare() {
            return Err(CellarError::AlreadyPrepared);
        }
        let Some(ids) = txn.two_phase_ids() else {
            return Err(CellarError::IllegalParams(
                "can't prepare a transaction that is not two-phase".to_string(),
            ));
        };
        if row.tx_id != ids.tx_id || row.coordinator_id != ids.coordinator_id {
            return Err(CellarError::IllegalParams(format!(
                "prepare row for {}:{} does not match transaction {}:{}",
                row.coordinator_id, row.tx_id, ids.coordinator_id, ids.tx_id
            )));
        }
        if let Some(engine) = txn.engine().cloned() {
            engine.prepare_two_phase(txn)?;
        }
        txn.set_prepared();
        tracing::debug!(txn = txn.id(), tx_id = ids.tx_id, "prepared");
        Ok(())
    }

    /// Build the PREPARE row of the active transaction and prepare it
    pub fn prepare_two_phase_current(&mut self) -> Result<()> {
        let txn = self.txn.as_ref().ok_or(CellarError::NoActiveTransaction)?;
        let ids = txn.two_phase_ids().ok_or_else(|| {
            CellarError::IllegalParams(
                "can't prepare a transaction that is not two-phase".to_string(),
            )
        })?;
        let mut row = RedoRow::new(RowType::Prepare, 0, Vec::new());
        row.replica_id = self.env.config().replica_id;
        row.tx_id = ids.tx_id;
        row.coordinator_id = ids.coordinator_id;
        self.prepare_two_phase(&row)
    }

    // =========================================================================
    // Commit / Rollback
    // =========================================================================

    /// Commit the active transaction, if any
    pub fn commit(&mut self) -> Result<()> {
        let Some(txn) = self.txn.as_ref() else {
            return Ok(());
        };
        if txn.in_sub_stmt() > 0 {
            return Err(CellarError::CommitInSubStatement);
        }
        if txn.is_two_phase() && !txn.in_prepare() {
            return Err(CellarError::CommitBeforePrepare);
        }
        self.commit_txn()
    }

    /// Roll back the active transaction, if any
    pub fn rollback(&mut self) -> Result<()> {
        match &self.txn {
            None => Ok(()),
            Some(txn) if txn.in_sub_stmt() > 0 => Err(CellarError::RollbackInSubStatement),
            Some(_) => {
                if let Some(txn) = self.txn.take() {
                    self.rollback_txn(txn);
                }
                Ok(())
            }
        }
    }

    /// Fail if a multi-statement transaction is active
    pub fn check_autocommit(&self, what: &str) -> Result<()> {
        match &self.txn {
            Some(txn) if !txn.is_autocommit() => Err(CellarError::Unsupported {
                what: what.to_string(),
                feature: "multi-statement transactions".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn commit_txn(&mut self) -> Result<()> {
        let Some(mut txn) = self.txn.take() else {
            return Ok(());
        };
        let Some(engine) = txn.engine().cloned() else {
            tracing::debug!(txn = txn.id(), "commit of an empty transaction");
            return Ok(());
        };

        // Step 1: single-phase prepare
        if !txn.is_two_phase() {
            if let Err(e) = engine.prepare(&mut txn) {
                tracing::debug!(txn = txn.id(), error = %e, "prepare failed");
                self.rollback_txn(txn);
                return Err(e);
            }
        }

        // Step 2: make the rows durable
        let signature = if txn.n_rows() > 0 {
            match flush_rows(&self.env, &mut txn) {
                Ok(signature) => signature,
                Err(e) => {
                    tracing::warn!(txn = txn.id(), rows = txn.n_rows(), error = %e, "WAL write failed");
                    self.rollback_txn(txn);
                    self.env.scheduler().reschedule();
                    return Err(if e.is_durability() {
                        e
                    } else {
                        CellarError::WalIo(e.to_string())
                    });
                }
            }
        } else {
            -1
        };

        // Step 3: engine commit and commit triggers
        if txn.n_rows() == 0 {
            // Nothing durable yet, so a failed engine commit is a rollback
            if let Err(e) = engine.commit(&mut txn, signature) {
                tracing::debug!(txn = txn.id(), error = %e, "engine commit failed");
                self.rollback_txn(txn);
                return Err(e);
            }
            txn.run_commit_triggers();
        } else {
            txn.run_commit_triggers();
            if let Err(e) = engine.commit(&mut txn, signature) {
                tracing::error!(
                    txn = txn.id(),
                    signature,
                    error = %e,
                    "engine commit failed after WAL write, aborting"
                );
                std::process::abort();
            }
        }
        tracing::debug!(txn = txn.id(), signature, rows = txn.n_rows(), "commit");
        Ok(())
    }

    fn rollback_txn(&self, mut txn: Transaction) {
        txn.run_rollback_triggers();
        if let Some(engine) = txn.engine().cloned() {
            engine.rollback(&mut txn);
        }
        tracing::debug!(txn = txn.id(), "rollback");
    }

    /// Innermost open statement of the active transaction
    pub fn current_statement_id(&self) -> Option<StatementId> {
        self.txn.as_ref()?.current_statement_id()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            tracing::warn!(txn = txn.id(), "session closed with an active transaction");
            self.rollback_txn(txn);
        }
    }
}
