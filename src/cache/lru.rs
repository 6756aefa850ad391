//! Entry arena with an intrusive LRU list
//!
//! Cache entries live in a slab and are addressed by `EntryId`. The LRU
//! order is a doubly-linked list threaded through the slots by index, so an
//! entry's tree position and its LRU position are two independent relations
//! over the same slot. Head is the most recently used entry.

use super::entry::CacheEntry;

/// Index of a live slot in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(u32);

struct Slot {
    entry: CacheEntry,
    prev: Option<EntryId>,
    next: Option<EntryId>,
}

/// Slab of cache entries linked in LRU order
pub(crate) struct EntryArena {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
}

impl EntryArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Store an entry and link it at the LRU head
    pub fn insert(&mut self, entry: CacheEntry) -> EntryId {
        let slot = Slot {
            entry,
            prev: None,
            next: None,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                EntryId(index)
            }
            None => {
                self.slots.push(Some(slot));
                EntryId((self.slots.len() - 1) as u32)
            }
        };
        self.link_head(id);
        self.len += 1;
        id
    }

    /// Unlink an entry from the LRU list and free its slot
    pub fn remove(&mut self, id: EntryId) -> Option<CacheEntry> {
        self.slots.get(id.0 as usize)?.as_ref()?;
        self.unlink(id);
        let slot = self.slots[id.0 as usize].take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(slot.entry)
    }

    /// Move an entry to the LRU head
    pub fn touch(&mut self, id: EntryId) {
        if self.head == Some(id) || self.get(id).is_none() {
            return;
        }
        self.unlink(id);
        self.link_head(id);
    }

    /// Least recently used entry
    pub fn tail(&self) -> Option<EntryId> {
        self.tail
    }

    pub fn get(&self, id: EntryId) -> Option<&CacheEntry> {
        self.slots
            .get(id.0 as usize)
            .and_then(|s| s.as_ref())
            .map(|s| &s.entry)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.entry)
    }

    fn slot(&self, id: EntryId) -> Option<&Slot> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: EntryId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    fn link_head(&mut self, id: EntryId) {
        let old_head = self.head;
        if let Some(slot) = self.slot_mut(id) {
            slot.prev = None;
            slot.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(slot) = self.slot_mut(h) {
                    slot.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn unlink(&mut self, id: EntryId) {
        let (prev, next) = match self.slot(id) {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slot_mut(n) {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.prev = None;
            slot.next = None;
        }
    }
}
