//! Redo rows
//!
//! The log representation of one statement. Log metadata (replica id, LSN,
//! timestamp) stays zero until the row is put into a WAL batch.

use serde::{Deserialize, Serialize};

/// Operation recorded by a redo row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowType {
    Insert,
    Replace,
    Delete,
    /// Two-phase prepare marker
    Prepare,
}

/// A single row of the redo log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedoRow {
    /// The operation
    pub row_type: RowType,

    /// Target space
    pub space_id: u32,

    /// Originating replica, 0 until assigned for local rows
    pub replica_id: u32,

    /// Log Sequence Number within `replica_id`
    pub lsn: i64,

    /// Client request sync
    pub sync: u64,

    /// Wall clock time (unix seconds) when the row was batched
    pub tm: f64,

    /// Two-phase transaction id, 0 for local transactions
    pub tx_id: u64,

    /// Two-phase coordinator id, 0 for local transactions
    pub coordinator_id: u32,

    /// Encoded request body
    pub body: Vec<u8>,
}

impl RedoRow {
    /// Row with empty log metadata
    pub fn new(row_type: RowType, space_id: u32, body: Vec<u8>) -> Self {
        Self {
            row_type,
            space_id,
            replica_id: 0,
            lsn: 0,
            sync: 0,
            tm: 0.0,
            tx_id: 0,
            coordinator_id: 0,
            body,
        }
    }

    /// True for rows originated by this instance (not yet stamped)
    pub fn is_local(&self) -> bool {
        self.replica_id == 0
    }
}
