//! Storage Engine Module
//!
//! The transaction layer drives storage through the `StorageEngine` hooks;
//! an engine keeps whatever per-transaction state it needs (write sets,
//! locks, read views) keyed by `Transaction::id`.
//!
//! ## Hook order
//! ```text
//! begin ─► begin_statement ─► (DML) ─┬─► begin_statement ...
//!                                    ├─► rollback_statement(stmt)
//!                                    ▼
//!            prepare | prepare_two_phase ─► commit(signature)
//!                         └───────────────► rollback
//! ```

mod memory;

pub use memory::{MemoryEngine, MemoryEngineStats, LATEST_VLSN};

use crate::error::Result;
use crate::txn::{StatementId, Transaction};

/// Engine-specific undo position taken when a statement starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub u64);

/// Pluggable storage backend, bound to a transaction by its first
/// statement
pub trait StorageEngine: Send + Sync {
    /// Engine name for diagnostics
    fn name(&self) -> &str;

    /// A transaction bound to this engine
    fn begin(&self, txn: &mut Transaction) -> Result<()>;

    /// A statement was opened; the engine may record a savepoint on
    /// `txn.current_statement_mut()`
    fn begin_statement(&self, txn: &mut Transaction) -> Result<()>;

    /// Single-phase prepare, before the WAL write
    fn prepare(&self, txn: &mut Transaction) -> Result<()>;

    /// Two-phase prepare, on the coordinator's request
    fn prepare_two_phase(&self, txn: &mut Transaction) -> Result<()>;

    /// Make the changes visible. `signature` is the WAL signature, or -1
    /// when the transaction wrote no rows. Errors after a WAL write are
    /// fatal to the process.
    fn commit(&self, txn: &mut Transaction, signature: i64) -> Result<()>;

    /// Discard every change of the transaction
    fn rollback(&self, txn: &mut Transaction);

    /// Undo `statement` and everything after it
    fn rollback_statement(&self, txn: &mut Transaction, statement: StatementId) -> Result<()>;
}
