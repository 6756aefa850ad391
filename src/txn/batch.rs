//! WAL batch assembly
//!
//! Collects the redo rows of a committing transaction into one batch, stamps
//! them with LSNs and the batch time, and hands the batch to the WAL.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::Result;

use super::env::TxnEnv;
use super::transaction::Transaction;

/// Write the redo rows of `txn` and return the commit signature
pub(crate) fn flush_rows(env: &TxnEnv, txn: &mut Transaction) -> Result<i64> {
    let tm = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let two_phase = txn.two_phase_ids();

    // The clock stays locked until the WAL accepted the batch, so batches
    // reach the WAL in LSN order
    let mut recovery = env.recovery();

    // Rows get LSNs in statement commit order
    let mut batch = Vec::with_capacity(txn.n_rows());
    for n in 0..txn.n_rows() {
        let Some(row) = txn.redo_row_mut(n) else {
            continue;
        };
        row.tm = tm;
        if let Some(ids) = two_phase {
            row.tx_id = ids.tx_id;
            row.coordinator_id = ids.coordinator_id;
        }
        recovery.fill_lsn(row)?;
        batch.push(row.clone());
    }

    let start = Instant::now();
    let result = match env.wal() {
        Some(wal) => wal.write(&batch),
        None => Ok(recovery.signature()),
    };
    drop(recovery);

    let elapsed = start.elapsed();
    if elapsed > env.config().too_long_threshold() {
        tracing::warn!(
            txn = txn.id(),
            rows = batch.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "too long WAL write"
        );
    }
    result
}
