//! Vector clock
//!
//! Last LSN seen from every replica. The sum of all components is the
//! signature of the state it describes and only ever grows.

use std::collections::BTreeMap;

use crate::error::{CellarError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VClock {
    lsns: BTreeMap<u32, i64>,
}

impl VClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a replica with LSN 0 (no-op if known)
    pub fn add_replica(&mut self, replica_id: u32) {
        self.lsns.entry(replica_id).or_insert(0);
    }

    pub fn has(&self, replica_id: u32) -> bool {
        self.lsns.contains_key(&replica_id)
    }

    /// LSN of a replica, 0 if unknown
    pub fn get(&self, replica_id: u32) -> i64 {
        self.lsns.get(&replica_id).copied().unwrap_or(0)
    }

    /// Bump the LSN of a replica and return the new value
    pub fn inc(&mut self, replica_id: u32) -> i64 {
        let lsn = self.lsns.entry(replica_id).or_insert(0);
        *lsn += 1;
        *lsn
    }

    /// Advance a replica to `lsn`, which must be ahead of the current value
    pub fn follow(&mut self, replica_id: u32, lsn: i64) -> Result<()> {
        let current = self.lsns.entry(replica_id).or_insert(0);
        if lsn <= *current {
            return Err(CellarError::LsnNotMonotonic {
                replica_id,
                current: *current,
                lsn,
            });
        }
        *current = lsn;
        Ok(())
    }

    /// Signature of the clock
    pub fn sum(&self) -> i64 {
        self.lsns.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.lsns.iter().map(|(&id, &lsn)| (id, lsn))
    }
}
