//! Transaction Module
//!
//! The write path: sessions open transactions, transactions collect
//! statements, and commit turns the statements' redo rows into one WAL
//! batch before the storage engine makes the changes visible.
//!
//! ## Commit path
//! ```text
//! Session::commit
//!   │
//!   ├─► StorageEngine::prepare          (conflict check, single-phase only)
//!   ├─► flush_rows ─► Recovery::fill_lsn ─► Wal::write ─► signature
//!   │        └─ failure: rollback, reschedule, report
//!   ├─► on_commit triggers
//!   └─► StorageEngine::commit(signature) (failure here is fatal)
//! ```

mod batch;
mod env;
mod request;
mod session;
mod statement;
mod transaction;

pub use env::{Scheduler, TxnEnv, YieldScheduler};
pub use request::Request;
pub use session::Session;
pub use statement::{Statement, StatementId};
pub use transaction::{Transaction, TwoPhaseIds};

/// Maximum depth of nested statements
pub const SUB_STMT_MAX: usize = 3;
