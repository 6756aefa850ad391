//! Error types for cellar
//!
//! Provides a unified error type for all operations. Variants are grouped
//! by how the caller is expected to react: protocol violations leave the
//! transaction untouched, durability failures arrive after a full rollback.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using CellarError
pub type Result<T> = std::result::Result<T, CellarError>;

/// Unified error type for cellar operations
#[derive(Debug, Error)]
pub enum CellarError {
    // -------------------------------------------------------------------------
    // Transaction Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Operation is not permitted when there is an active transaction")]
    ActiveTransaction,

    #[error("Operation is not permitted when there is no active transaction")]
    NoActiveTransaction,

    #[error("Maximum number of nested statements exceeded")]
    SubStatementMax,

    #[error("Can not change a prepared transaction")]
    ChangePrepared,

    #[error("A multi-statement transaction can not use multiple storage engines")]
    CrossEngineTransaction,

    #[error("Can not commit transaction in a nested statement")]
    CommitInSubStatement,

    #[error("Can not rollback transaction in a nested statement")]
    RollbackInSubStatement,

    #[error("Transaction is already prepared")]
    AlreadyPrepared,

    #[error("Can not commit a two-phase transaction before prepare")]
    CommitBeforePrepare,

    #[error("Illegal parameters, {0}")]
    IllegalParams(String),

    #[error("{what} does not support {feature}")]
    Unsupported { what: String, feature: String },

    // -------------------------------------------------------------------------
    // WAL / Durability Errors
    // -------------------------------------------------------------------------
    #[error("Failed to write to disk: {0}")]
    WalIo(String),

    #[error("WAL write timed out after {0:?}")]
    WalTimeout(Duration),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Replica {0} is not registered")]
    UnknownReplica(u32),

    #[error("LSN for replica {replica_id} is not monotonic: {current} -> {lsn}")]
    LsnNotMonotonic {
        replica_id: u32,
        current: i64,
        lsn: i64,
    },

    // -------------------------------------------------------------------------
    // Storage Engine Errors
    // -------------------------------------------------------------------------
    #[error("Transaction has been aborted by conflict")]
    Conflict,

    #[error("Duplicate key exists in unique index of space {0}")]
    DuplicateKey(u32),

    #[error("Space {0} does not exist")]
    NoSuchSpace(u32),

    #[error("Storage engine error: {0}")]
    Engine(String),

    // -------------------------------------------------------------------------
    // Trigger Errors
    // -------------------------------------------------------------------------
    #[error("Trigger failed: {0}")]
    Trigger(String),

    // -------------------------------------------------------------------------
    // I/O, Serialization and Configuration Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CellarError {
    /// True for failures of the durable write, reported after the
    /// transaction has already been rolled back.
    pub fn is_durability(&self) -> bool {
        matches!(
            self,
            CellarError::WalIo(_) | CellarError::WalTimeout(_) | CellarError::WalCorruption(_)
        )
    }

    /// True for synchronous protocol violations that leave the transaction
    /// state unchanged.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            CellarError::ActiveTransaction
                | CellarError::NoActiveTransaction
                | CellarError::SubStatementMax
                | CellarError::ChangePrepared
                | CellarError::CrossEngineTransaction
                | CellarError::CommitInSubStatement
                | CellarError::RollbackInSubStatement
                | CellarError::AlreadyPrepared
                | CellarError::CommitBeforePrepare
                | CellarError::IllegalParams(_)
                | CellarError::Unsupported { .. }
        )
    }
}

impl From<bincode::Error> for CellarError {
    fn from(e: bincode::Error) -> Self {
        CellarError::Serialization(e.to_string())
    }
}
