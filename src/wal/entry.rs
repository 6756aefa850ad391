//! WAL frame encoding
//!
//! Every redo row is stored as one frame: a fixed header followed by the
//! bincode-encoded row. The CRC covers the payload only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CellarError, Result};

use super::row::RedoRow;

/// Size of the frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound for a single payload, anything larger is treated as garbage
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub lsn: i64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CellarError::WalCorruption(format!(
                "frame header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        let lsn = buf.get_i64_le();
        let crc = buf.get_u32_le();
        let len = buf.get_u32_le();
        if len as usize > MAX_PAYLOAD_SIZE {
            return Err(CellarError::WalCorruption(format!(
                "frame payload of {} bytes at lsn {}",
                len, lsn
            )));
        }
        Ok(Self { lsn, crc, len })
    }
}

/// Encode a row into a complete frame
pub fn encode_frame(row: &RedoRow) -> Result<Bytes> {
    let payload = bincode::serialize(row)?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_i64_le(row.lsn);
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Verify and decode the payload of a frame
pub fn decode_payload(header: &FrameHeader, payload: &[u8]) -> Result<RedoRow> {
    let crc = crc32fast::hash(payload);
    if crc != header.crc {
        return Err(CellarError::WalCorruption(format!(
            "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
            header.lsn, header.crc, crc
        )));
    }
    let row: RedoRow = bincode::deserialize(payload).map_err(|e| {
        CellarError::WalCorruption(format!("undecodable row at lsn {}: {}", header.lsn, e))
    })?;
    if row.lsn != header.lsn {
        return Err(CellarError::WalCorruption(format!(
            "header lsn {} does not match row lsn {}",
            header.lsn, row.lsn
        )));
    }
    Ok(row)
}
