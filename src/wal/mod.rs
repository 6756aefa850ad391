//! Write-Ahead Log (WAL) Module
//!
//! Durability boundary of the transaction layer. A committing transaction
//! hands its redo rows to a `Wal` in one batch and gets back a signature;
//! only then does the storage engine make the changes visible.
//!
//! ## Responsibilities
//! - Assign LSNs to redo rows (`Recovery`)
//! - Append batches with CRC32 checksums (`WalWriter`)
//! - Serve concurrent sessions from one writer thread (`WalThread`)
//! - Scan existing logs, cutting off torn tails (`WalReader`, `WalRecovery`)
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Row 1                                   │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Row    │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Row 2                                   │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Row    │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod reader;
mod recovery;
mod row;
mod thread;
mod vclock;
mod writer;

pub use entry::{encode_frame, FrameHeader, HEADER_SIZE};
pub use reader::{WalReader, WalRows};
pub use recovery::{Recovery, RecoveryResult, WalRecovery};
pub use row::{RedoRow, RowType};
pub use thread::WalThread;
pub use vclock::VClock;
pub use writer::WalWriter;

use crate::error::Result;

/// Durable sink for redo rows.
///
/// `write` blocks until every row of the batch is written and returns the
/// signature of the log after the batch (the sum of its vector clock). The
/// rows are on disk when it returns unless the log was opened with a relaxed
/// sync strategy (`WalSyncStrategy::EveryNEntries`), in which case a crash
/// may lose the unsynced tail. An error means no row of the batch may be
/// treated as durable.
pub trait Wal: Send + Sync {
    fn write(&self, rows: &[RedoRow]) -> Result<i64>;
}

/// WAL file name inside the data directory
pub const WAL_FILE_NAME: &str = "wal.log";
