//! DML requests
//!
//! What a client asked for, in the form the redo log stores it. A request
//! relayed from another replica carries its original log header, which is
//! used as the redo row unchanged.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key_def::Key;
use crate::tuple::{Tuple, Value};
use crate::wal::{RedoRow, RowType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_type: RowType,
    pub space_id: u32,
    /// Tuple fields for insert/replace, key parts for delete
    pub ops: Vec<Value>,
    /// Log header of a relayed row
    #[serde(skip)]
    pub header: Option<RedoRow>,
}

impl Request {
    pub fn insert(space_id: u32, tuple: &Tuple) -> Self {
        Self::new(RowType::Insert, space_id, tuple.fields().to_vec())
    }

    pub fn replace(space_id: u32, tuple: &Tuple) -> Self {
        Self::new(RowType::Replace, space_id, tuple.fields().to_vec())
    }

    pub fn delete(space_id: u32, key: &Key) -> Self {
        Self::new(RowType::Delete, space_id, key.parts().to_vec())
    }

    fn new(request_type: RowType, space_id: u32, ops: Vec<Value>) -> Self {
        Self {
            request_type,
            space_id,
            ops,
            header: None,
        }
    }

    /// Attach the log header the request arrived with
    pub fn with_header(mut self, header: RedoRow) -> Self {
        self.header = Some(header);
        self
    }

    /// Redo row for this request; log metadata is filled in at WAL time
    pub fn to_redo_row(&self) -> Result<RedoRow> {
        if let Some(header) = &self.header {
            return Ok(header.clone());
        }
        let body = bincode::serialize(&self.ops)?;
        Ok(RedoRow::new(self.request_type, self.space_id, body))
    }

    /// Decode the ops of a redo row produced by `to_redo_row`
    pub fn decode_ops(row: &RedoRow) -> Result<Vec<Value>> {
        Ok(bincode::deserialize(&row.body)?)
    }
}
