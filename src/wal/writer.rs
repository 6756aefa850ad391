//! WAL Writer
//!
//! Appends batches of redo rows to the WAL file. Opening an existing file
//! scans it first: a torn tail is cut off and the clock continues from the
//! last valid row.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::entry::encode_frame;
use super::recovery::WalRecovery;
use super::row::RedoRow;
use super::vclock::VClock;

/// Writes redo rows to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: BufWriter<File>,
    sync_strategy: WalSyncStrategy,
    /// Rows written since the last fsync
    unsynced: usize,
    vclock: VClock,
    rows_written: u64,
}

impl WalWriter {
    /// Open or create a WAL file
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let vclock = if path.exists() {
            let result = WalRecovery::verify(path)?;
            if result.was_truncated {
                tracing::warn!(
                    path = %path.display(),
                    valid_len = result.valid_len,
                    "discarding WAL tail"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(result.valid_len)?;
                file.sync_all()?;
            }
            result.vclock
        } else {
            VClock::new()
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), signature = vclock.sum(), "WAL opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            sync_strategy,
            unsynced: 0,
            vclock,
            rows_written: 0,
        })
    }

    /// Append a batch and return the signature of the log after it.
    ///
    /// Rows must carry LSNs that advance the clock.
    pub fn write_batch(&mut self, rows: &[RedoRow]) -> Result<i64> {
        let mut next = self.vclock.clone();
        for row in rows {
            next.follow(row.replica_id, row.lsn)?;
        }
        for row in rows {
            let frame = encode_frame(row)?;
            self.file.write_all(&frame)?;
        }
        self.file.flush()?;

        self.vclock = next;
        self.rows_written += rows.len() as u64;
        self.unsynced += rows.len();
        let sync_due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if sync_due {
            self.sync()?;
        }
        Ok(self.vclock.sum())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Clock of the last written row
    pub fn vclock(&self) -> &VClock {
        &self.vclock
    }

    /// Rows written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.unsynced
    }

    /// Rows written through this writer
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.unsynced > 0 {
            if let Err(e) = self.sync() {
                tracing::error!(error = %e, "failed to sync WAL on close");
            }
        }
    }
}
