//! Recovery
//!
//! Two halves of bringing a node back and keeping it consistent:
//! - `WalRecovery` scans an existing WAL, stopping at the first torn or
//!   corrupted frame
//! - `Recovery` hands out LSNs for new rows. Local rows get the next LSN of
//!   the local replica; rows relayed from other replicas keep theirs and
//!   only advance the clock.

use std::path::Path;

use crate::error::{CellarError, Result};

use super::reader::WalReader;
use super::row::RedoRow;
use super::vclock::VClock;

/// Scans WAL files
pub struct WalRecovery;

/// Outcome of a WAL scan
#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    /// Rows read successfully
    pub rows_recovered: u64,

    /// Frames rejected by checksum (the scan stops at the first one)
    pub rows_corrupted: u64,

    /// Clock after applying every recovered row
    pub vclock: VClock,

    /// Length of the valid prefix of the file
    pub valid_len: u64,

    /// True if bytes past `valid_len` have to be discarded
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Read every valid row of the WAL at `path`
    pub fn recover(path: &Path) -> Result<(Vec<RedoRow>, RecoveryResult)> {
        let mut rows = Vec::new();
        let result = Self::scan(path, |row| rows.push(row))?;
        Ok((rows, result))
    }

    /// Like `recover` but only collects statistics
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| {})
    }

    fn scan(path: &Path, mut on_row: impl FnMut(RedoRow)) -> Result<RecoveryResult> {
        let mut reader = WalReader::open(path)?;
        let mut result = RecoveryResult::default();
        loop {
            match reader.next_row() {
                Ok(Some(row)) => {
                    if let Err(e) = result.vclock.follow(row.replica_id, row.lsn) {
                        tracing::warn!(error = %e, "WAL row out of order, stopping recovery");
                        result.rows_corrupted += 1;
                        break;
                    }
                    result.rows_recovered += 1;
                    on_row(row);
                }
                Ok(None) => break,
                Err(CellarError::WalCorruption(reason)) => {
                    tracing::warn!(%reason, offset = reader.offset(), "corrupted WAL frame");
                    result.rows_corrupted += 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        result.valid_len = reader.offset();
        result.was_truncated = reader.offset() < reader.file_len();
        tracing::debug!(
            rows = result.rows_recovered,
            corrupted = result.rows_corrupted,
            truncated = result.was_truncated,
            "WAL scan finished"
        );
        Ok(result)
    }
}

/// LSN bookkeeping of this instance
#[derive(Debug, Clone)]
pub struct Recovery {
    replica_id: u32,
    vclock: VClock,
}

impl Recovery {
    /// Start from an empty clock
    pub fn new(replica_id: u32) -> Result<Self> {
        Self::with_vclock(replica_id, VClock::new())
    }

    /// Continue from a known clock (e.g. the end of an existing WAL)
    pub fn with_vclock(replica_id: u32, mut vclock: VClock) -> Result<Self> {
        if replica_id == 0 {
            return Err(CellarError::Config(
                "replica id 0 is reserved for unstamped rows".to_string(),
            ));
        }
        vclock.add_replica(replica_id);
        Ok(Self { replica_id, vclock })
    }

    pub fn replica_id(&self) -> u32 {
        self.replica_id
    }

    pub fn vclock(&self) -> &VClock {
        &self.vclock
    }

    /// Accept rows from another replica
    pub fn register_replica(&mut self, replica_id: u32) {
        self.vclock.add_replica(replica_id);
    }

    /// Assign log metadata to a row about to be written
    pub fn fill_lsn(&mut self, row: &mut RedoRow) -> Result<()> {
        if row.is_local() {
            row.replica_id = self.replica_id;
            row.lsn = self.vclock.inc(self.replica_id);
            return Ok(());
        }
        if !self.vclock.has(row.replica_id) {
            return Err(CellarError::UnknownReplica(row.replica_id));
        }
        self.vclock.follow(row.replica_id, row.lsn)
    }

    /// Signature of the current state
    pub fn signature(&self) -> i64 {
        self.vclock.sum()
    }
}
