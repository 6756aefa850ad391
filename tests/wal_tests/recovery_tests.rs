//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL (no corruption)
//! - Recovery from an empty WAL
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted frames (CRC mismatch)
//! - The writer cutting off a torn tail on open
//! - LSN assignment for local and relayed rows

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use cellar::config::WalSyncStrategy;
use cellar::wal::{encode_frame, Recovery, RedoRow, RowType, WalRecovery, WalWriter, HEADER_SIZE};
use cellar::CellarError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn row(lsn: i64) -> RedoRow {
    let mut row = RedoRow::new(RowType::Insert, 512, format!("row-{}", lsn).into_bytes());
    row.replica_id = 1;
    row.lsn = lsn;
    row
}

/// Write rows using WalWriter (produces a well-formed WAL)
fn write_rows_via_writer(path: &PathBuf, count: i64) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    let rows: Vec<RedoRow> = (1..=count).map(row).collect();
    writer.write_batch(&rows).unwrap();
}

/// Write raw frames directly to a file (for crafting corruption)
fn write_raw(path: &PathBuf, chunks: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for chunk in chunks {
        file.write_all(chunk).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(rows.is_empty());
    assert_eq!(result.rows_recovered, 0);
    assert_eq!(result.rows_corrupted, 0);
    assert_eq!(result.vclock.sum(), 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_rows() {
    let (_temp, wal_path) = setup_temp_wal();
    write_rows_via_writer(&wal_path, 10);

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(result.rows_recovered, 10);
    assert_eq!(result.rows_corrupted, 0);
    assert_eq!(result.vclock.get(1), 10);
    assert!(!result.was_truncated);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.lsn, (i + 1) as i64);
    }
}

// =============================================================================
// Recover: Partial Write Tests
// =============================================================================

#[test]
fn test_recover_partial_header_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = encode_frame(&row(1)).unwrap();
    write_raw(&wal_path, &[&good, &[0u8; 8]]);

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(result.vclock.get(1), 1);
    assert_eq!(result.valid_len, good.len() as u64);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_partial_data_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = encode_frame(&row(1)).unwrap();
    let torn = encode_frame(&row(2)).unwrap();
    write_raw(&wal_path, &[&good, &torn[..HEADER_SIZE + 4]]);

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(result.rows_corrupted, 0);
    assert!(result.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests (CRC mismatch)
// =============================================================================

#[test]
fn test_recover_corrupted_frame() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = encode_frame(&row(1)).unwrap();
    let mut bad = encode_frame(&row(2)).unwrap().to_vec();
    if let Some(byte) = bad.last_mut() {
        *byte ^= 0xFF;
    }
    let after = encode_frame(&row(3)).unwrap();
    write_raw(&wal_path, &[&good, &bad, &after]);

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();

    // Recovery stops at the first bad frame
    assert_eq!(rows.len(), 1);
    assert_eq!(result.rows_corrupted, 1);
    assert_eq!(result.vclock.get(1), 1);
    assert!(result.was_truncated);
}

#[test]
fn test_verify_matches_recover() {
    let (_temp, wal_path) = setup_temp_wal();
    write_rows_via_writer(&wal_path, 5);

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.rows_recovered, 5);
    assert_eq!(result.vclock.sum(), 5);
    assert!(!result.was_truncated);
}

// =============================================================================
// Writer Reopen Tests
// =============================================================================

#[test]
fn test_writer_discards_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_rows_via_writer(&wal_path, 3);
    {
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[0xAB; 11]).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.vclock().get(1), 3);
    writer.write_batch(&[row(4)]).unwrap();
    drop(writer);

    let (rows, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(!result.was_truncated);
}

// =============================================================================
// LSN Assignment Tests
// =============================================================================

#[test]
fn test_fill_lsn_continues_from_recovered_clock() {
    let (_temp, wal_path) = setup_temp_wal();
    write_rows_via_writer(&wal_path, 4);
    let (_, result) = WalRecovery::recover(&wal_path).unwrap();

    let mut recovery = Recovery::with_vclock(1, result.vclock).unwrap();
    let mut local = RedoRow::new(RowType::Replace, 512, Vec::new());
    recovery.fill_lsn(&mut local).unwrap();

    assert_eq!(local.replica_id, 1);
    assert_eq!(local.lsn, 5);
    assert_eq!(recovery.signature(), 5);
}

#[test]
fn test_relayed_row_must_advance() {
    let mut recovery = Recovery::new(1).unwrap();
    recovery.register_replica(2);

    let mut first = RedoRow::new(RowType::Replace, 512, Vec::new());
    first.replica_id = 2;
    first.lsn = 3;
    recovery.fill_lsn(&mut first).unwrap();

    let mut stale = first.clone();
    let err = recovery.fill_lsn(&mut stale).unwrap_err();
    assert!(matches!(
        err,
        CellarError::LsnNotMonotonic {
            replica_id: 2,
            current: 3,
            lsn: 3
        }
    ));
}
