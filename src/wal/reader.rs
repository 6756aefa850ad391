//! WAL Reader
//!
//! Sequential reader over WAL frames. A frame cut short by a crash at the
//! tail of the file reads as end of log; a frame with a bad checksum is an
//! error.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{CellarError, Result};

use super::entry::{decode_payload, FrameHeader, HEADER_SIZE};
use super::row::RedoRow;

/// Reads rows from a WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// End of the last frame read successfully
    offset: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
            file_len,
        })
    }

    /// Offset just past the last complete, valid frame
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Read the next row; `Ok(None)` at the end of the log
    pub fn next_row(&mut self) -> Result<Option<RedoRow>> {
        let mut header_buf = [0u8; HEADER_SIZE];
        if !self.read_full(&mut header_buf)? {
            return Ok(None);
        }
        let header = FrameHeader::decode(&header_buf)?;

        let mut payload = vec![0u8; header.len as usize];
        if !self.read_full(&mut payload)? {
            return Ok(None);
        }
        let row = decode_payload(&header, &payload)?;
        self.offset += (HEADER_SIZE + payload.len()) as u64;
        Ok(Some(row))
    }

    /// Iterate over all rows up to the first error
    pub fn rows(self) -> WalRows {
        WalRows {
            reader: self,
            done: false,
        }
    }

    /// false on a clean or torn end of file
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(CellarError::Io(e)),
        }
    }
}

/// Iterator over WAL rows
pub struct WalRows {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalRows {
    type Item = Result<RedoRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
