//! Cache entries and tree keys

use std::cmp::Ordering;
use std::sync::Arc;

use crate::key_def::Key;
use crate::tuple::{Tuple, Value};

use super::CacheId;

/// No value exists between this entry and its left tree neighbor
pub(crate) const LEFT_LINKED: u8 = 0x01;

/// No value exists between this entry and its right tree neighbor
pub(crate) const RIGHT_LINKED: u8 = 0x02;

/// One cached tuple
///
/// `left_boundary_level == n` means no value to the left of this one
/// shares its first `n` key parts; `part_count` carries no information.
/// Same for the right side.
pub(crate) struct CacheEntry {
    pub cache: CacheId,
    pub tuple: Arc<Tuple>,
    pub key: TreeKey,
    pub flags: u8,
    pub left_boundary_level: u8,
    pub right_boundary_level: u8,
    pub size: usize,
}

impl CacheEntry {
    pub fn new(cache: CacheId, tuple: Arc<Tuple>, key: TreeKey, part_count: u8) -> Self {
        let size = std::mem::size_of::<CacheEntry>() + tuple.size();
        Self {
            cache,
            tuple,
            key,
            flags: 0,
            left_boundary_level: part_count,
            right_boundary_level: part_count,
            size,
        }
    }

    /// Link flag facing `direction` (+1 right, -1 left)
    pub fn link_flag(direction: i8) -> u8 {
        if direction > 0 {
            RIGHT_LINKED
        } else {
            LEFT_LINKED
        }
    }

    pub fn is_linked(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Boundary level facing `direction` (+1 right, -1 left)
    pub fn boundary_level(&self, direction: i8) -> u8 {
        if direction > 0 {
            self.right_boundary_level
        } else {
            self.left_boundary_level
        }
    }
}

/// Where a probe sorts relative to stored keys sharing its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Bias {
    Before,
    Exact,
    After,
}

/// Ordering key of the cache tree
///
/// Stored keys are full keys with `Bias::Exact`. Search probes carry a
/// key prefix and sort before or after every stored key with that prefix.
#[derive(Debug, Clone)]
pub(crate) struct TreeKey {
    parts: Vec<Value>,
    bias: Bias,
}

impl TreeKey {
    pub fn exact(parts: Vec<Value>) -> Self {
        Self {
            parts,
            bias: Bias::Exact,
        }
    }

    /// Probe sorting before all keys starting with `key`
    pub fn before(key: &Key) -> Self {
        Self {
            parts: key.parts().to_vec(),
            bias: Bias::Before,
        }
    }

    /// Probe sorting after all keys starting with `key`
    pub fn after(key: &Key) -> Self {
        Self {
            parts: key.parts().to_vec(),
            bias: Bias::After,
        }
    }

    /// True if the first `key.len()` parts equal `key`
    pub fn starts_with(&self, key: &Key) -> bool {
        key.len() <= self.parts.len() && self.parts[..key.len()] == *key.parts()
    }

    /// Number of leading parts shared with `other`
    pub fn common_prefix(&self, other: &TreeKey) -> u8 {
        self.parts
            .iter()
            .zip(&other.parts)
            .take_while(|(a, b)| a == b)
            .count() as u8
    }
}

impl Ord for TreeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.parts.iter().zip(&other.parts) {
            let ord = a.cmp(b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        match self.parts.len().cmp(&other.parts.len()) {
            Ordering::Equal => self.bias.cmp(&other.bias),
            Ordering::Less => prefix_order(self.bias),
            Ordering::Greater => prefix_order(other.bias).reverse(),
        }
    }
}

/// Order of a shorter key against a longer one with the same prefix
fn prefix_order(bias: Bias) -> Ordering {
    match bias {
        Bias::After => Ordering::Greater,
        Bias::Before | Bias::Exact => Ordering::Less,
    }
}

impl PartialOrd for TreeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TreeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TreeKey {}
