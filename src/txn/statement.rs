//! Statements
//!
//! The effect record of one row-level operation: the images the engine
//! produced, the engine's savepoint taken before it, and the redo row once
//! the statement is committed.

use std::fmt;
use std::sync::Arc;

use crate::engine::Savepoint;
use crate::space::Space;
use crate::tuple::Tuple;
use crate::wal::RedoRow;

/// Position of a statement inside its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatementId(pub(crate) usize);

impl StatementId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Statement {
    space: Arc<Space>,
    /// Pre-image, `None` for an insert
    old_tuple: Option<Arc<Tuple>>,
    /// Post-image, `None` for a delete
    new_tuple: Option<Arc<Tuple>>,
    engine_savepoint: Option<Savepoint>,
    row: Option<RedoRow>,
}

impl Statement {
    pub(crate) fn new(space: Arc<Space>) -> Self {
        Self {
            space,
            old_tuple: None,
            new_tuple: None,
            engine_savepoint: None,
            row: None,
        }
    }

    pub fn space(&self) -> &Arc<Space> {
        &self.space
    }

    pub fn old_tuple(&self) -> Option<&Arc<Tuple>> {
        self.old_tuple.as_ref()
    }

    pub fn new_tuple(&self) -> Option<&Arc<Tuple>> {
        self.new_tuple.as_ref()
    }

    pub fn set_old_tuple(&mut self, tuple: Option<Arc<Tuple>>) {
        self.old_tuple = tuple;
    }

    pub fn set_new_tuple(&mut self, tuple: Option<Arc<Tuple>>) {
        self.new_tuple = tuple;
    }

    /// True if the statement changed anything
    pub fn has_images(&self) -> bool {
        self.old_tuple.is_some() || self.new_tuple.is_some()
    }

    pub fn engine_savepoint(&self) -> Option<Savepoint> {
        self.engine_savepoint
    }

    pub fn set_engine_savepoint(&mut self, savepoint: Savepoint) {
        self.engine_savepoint = Some(savepoint);
    }

    /// Redo row, present once the statement was committed against a
    /// persistent space
    pub fn row(&self) -> Option<&RedoRow> {
        self.row.as_ref()
    }

    pub(crate) fn row_mut(&mut self) -> Option<&mut RedoRow> {
        self.row.as_mut()
    }

    pub(crate) fn set_row(&mut self, row: RedoRow) {
        self.row = Some(row);
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("space", &self.space.id())
            .field("old_tuple", &self.old_tuple)
            .field("new_tuple", &self.new_tuple)
            .field("engine_savepoint", &self.engine_savepoint)
            .field("row", &self.row.as_ref().map(|r| (r.row_type, r.lsn)))
            .finish()
    }
}
