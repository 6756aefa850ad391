//! Key definitions, search keys and iterator types
//!
//! A `KeyDef` lists the tuple fields that form an index key. Comparing two
//! tuples compares their key parts lexicographically. A search `Key` may
//! carry fewer parts than the definition; it then matches every tuple
//! sharing that prefix.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::tuple::{Tuple, Value};

/// Ordered list of indexed field numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDef {
    parts: Vec<usize>,
}

impl KeyDef {
    /// Create a key definition over the given field numbers
    pub fn new(parts: Vec<usize>) -> Self {
        assert!(!parts.is_empty(), "key definition needs at least one part");
        assert!(parts.len() <= u8::MAX as usize, "too many key parts");
        Self { parts }
    }

    /// Number of key parts
    pub fn part_count(&self) -> u8 {
        self.parts.len() as u8
    }

    pub fn parts(&self) -> &[usize] {
        &self.parts
    }

    /// Extract the full key of a tuple
    ///
    /// Missing fields are not allowed in indexed tuples; they are
    /// rejected by the engine before reaching an index.
    pub fn extract_key(&self, tuple: &Tuple) -> Key {
        Key::new(
            self.parts
                .iter()
                .filter_map(|&field_no| tuple.field(field_no).cloned())
                .collect(),
        )
    }

    /// True if the tuple has every indexed field
    pub fn covers(&self, tuple: &Tuple) -> bool {
        self.parts.iter().all(|&field_no| tuple.field(field_no).is_some())
    }

    /// Total order of two tuples by this key definition
    pub fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        for &field_no in &self.parts {
            let ord = a.field(field_no).cmp(&b.field(field_no));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare a tuple with a (possibly partial) search key
    ///
    /// Only the parts present in the key take part in the comparison.
    pub fn compare_with_key(&self, tuple: &Tuple, key: &Key) -> Ordering {
        for (&field_no, part) in self.parts.iter().zip(key.parts()) {
            let ord = match tuple.field(field_no) {
                Some(v) => v.cmp(part),
                None => Ordering::Less,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// A search key: leading key parts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    parts: Vec<Value>,
}

impl Key {
    pub fn new(parts: Vec<Value>) -> Self {
        Self { parts }
    }

    /// Key without parts: matches everything
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of key parts, capped by the key definition
    pub fn part_count(&self, key_def: &KeyDef) -> u8 {
        self.parts.len().min(key_def.part_count() as usize) as u8
    }

    pub fn into_parts(self) -> Vec<Value> {
        self.parts
    }
}

/// Build a search key from anything convertible to values
#[macro_export]
macro_rules! key {
    ($($v:expr),* $(,)?) => {
        $crate::key_def::Key::new(vec![$($crate::tuple::Value::from($v)),*])
    };
}

/// Iterator type of an index search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    /// key == x, ascending
    Eq,
    /// key == x, descending
    Req,
    /// all tuples
    All,
    /// key < x
    Lt,
    /// key <= x
    Le,
    /// key >= x
    Ge,
    /// key > x
    Gt,
}

impl IteratorType {
    /// +1 for forward iteration, -1 for backward
    pub fn direction(self) -> i8 {
        match self {
            IteratorType::Eq | IteratorType::All | IteratorType::Ge | IteratorType::Gt => 1,
            IteratorType::Req | IteratorType::Lt | IteratorType::Le => -1,
        }
    }

    /// True for equality iterators in either direction
    pub fn is_equality(self) -> bool {
        matches!(self, IteratorType::Eq | IteratorType::Req)
    }

    /// Iterator type actually used for a search with `key`.
    ///
    /// Without a key EQ and GT degrade to GE, LT to LE; ALL is always GE.
    pub fn normalize(self, key: &Key) -> IteratorType {
        match self {
            IteratorType::All => IteratorType::Ge,
            IteratorType::Eq | IteratorType::Gt if key.is_empty() => IteratorType::Ge,
            IteratorType::Req | IteratorType::Lt if key.is_empty() => IteratorType::Le,
            other => other,
        }
    }
}
