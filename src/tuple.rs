//! Tuples and field values
//!
//! A tuple is an ordered list of fields plus the LSN it was committed at.
//! Tuples are shared between the row store, open statements and the tuple
//! cache, so they travel as `Arc<Tuple>`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// LSN carried by tuples that belong to an uncommitted write set.
pub const UNCOMMITTED_LSN: i64 = i64::MAX;

/// A single field value
///
/// Values of different kinds order by kind first, so the order is total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Unsigned(u64),
    Integer(i64),
    Str(String),
    Bin(Vec<u8>),
}

impl Value {
    /// Approximate memory footprint in bytes
    pub fn size(&self) -> usize {
        let payload = match self {
            Value::Unsigned(_) | Value::Integer(_) => 0,
            Value::Str(s) => s.len(),
            Value::Bin(b) => b.len(),
        };
        std::mem::size_of::<Value>() + payload
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bin(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "'{}'", v),
            Value::Bin(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// A stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    fields: Vec<Value>,
    /// Commit LSN, `UNCOMMITTED_LSN` while the tuple is in a write set
    lsn: i64,
}

impl Tuple {
    /// Create an uncommitted tuple
    pub fn new(fields: Vec<Value>) -> Self {
        Self {
            fields,
            lsn: UNCOMMITTED_LSN,
        }
    }

    /// Create a tuple committed at `lsn`
    pub fn with_lsn(fields: Vec<Value>, lsn: i64) -> Self {
        Self { fields, lsn }
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, field_no: usize) -> Option<&Value> {
        self.fields.get(field_no)
    }

    pub fn lsn(&self) -> i64 {
        self.lsn
    }

    /// True while the tuple belongs to a transaction's write set
    pub fn is_uncommitted(&self) -> bool {
        self.lsn == UNCOMMITTED_LSN
    }

    /// Copy of this tuple stamped with a commit LSN
    pub fn committed(&self, lsn: i64) -> Arc<Tuple> {
        Arc::new(Tuple {
            fields: self.fields.clone(),
            lsn,
        })
    }

    /// Approximate memory footprint in bytes
    pub fn size(&self) -> usize {
        std::mem::size_of::<Tuple>() + self.fields.iter().map(Value::size).sum::<usize>()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// Build a tuple from anything convertible to values
///
/// ```
/// use cellar::tuple;
/// let t = tuple![1u64, "one"];
/// assert_eq!(t.fields().len(), 2);
/// ```
#[macro_export]
macro_rules! tuple {
    ($($v:expr),* $(,)?) => {
        $crate::tuple::Tuple::new(vec![$($crate::tuple::Value::from($v)),*])
    };
}
