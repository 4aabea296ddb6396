//! Recency list ordered from most to least recently used
//!
//! Entries live in a slot arena and link to each other by slot index, so
//! relinking is O(1) without owning pointers in both directions. A handle
//! pairs a slot with the generation it was issued under; freeing a slot bumps
//! its generation, so a handle outliving its entry is rejected instead of
//! aliasing whatever reuses the slot.

use std::fmt;

use crate::error::{Error, Result};

/// Handle to an entry in a [`RecencyList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    slot: usize,
    generation: u64,
}

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} gen {}", self.slot, self.generation)
    }
}

/// Cached pair plus its neighbours in recency order
struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<K, V> {
    generation: u64,
    entry: Option<Entry<K, V>>,
}

/// Doubly linked list of entries, head = MRU, tail = LRU
pub(crate) struct RecencyList<K, V> {
    slots: Vec<Slot<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create a new entry and link it in as the head
    pub fn insert_at_head(&mut self, key: K, value: V) -> EntryHandle {
        let idx = self.alloc_slot();
        let slot = &mut self.slots[idx];
        slot.entry = Some(Entry {
            key,
            value,
            prev: None,
            next: None,
        });
        let handle = EntryHandle {
            slot: idx,
            generation: slot.generation,
        };

        self.link_at_head(idx);
        self.len += 1;
        handle
    }

    /// Detach an entry and hand back its key and value
    pub fn remove(&mut self, handle: EntryHandle) -> Result<(K, V)> {
        self.check(handle)?;
        self.unlink(handle.slot);
        self.len -= 1;
        self.free_slot(handle.slot).ok_or(Error::StaleHandle(handle))
    }

    /// Make an entry the head; no-op if it already is
    pub fn move_to_head(&mut self, handle: EntryHandle) -> Result<()> {
        self.check(handle)?;
        if self.head == Some(handle.slot) {
            return Ok(());
        }

        self.unlink(handle.slot);
        self.link_at_head(handle.slot);
        Ok(())
    }

    /// Remove the least recently used entry, `None` when empty
    pub fn evict_tail(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        let handle = EntryHandle {
            slot: idx,
            generation: self.slots[idx].generation,
        };
        self.remove(handle).ok()
    }

    pub fn value(&self, handle: EntryHandle) -> Result<&V> {
        self.check(handle)?;
        self.entry(handle.slot)
            .map(|entry| &entry.value)
            .ok_or(Error::StaleHandle(handle))
    }

    pub fn value_mut(&mut self, handle: EntryHandle) -> Result<&mut V> {
        self.check(handle)?;
        self.slots[handle.slot]
            .entry
            .as_mut()
            .map(|entry| &mut entry.value)
            .ok_or(Error::StaleHandle(handle))
    }

    /// Walk entries from head to tail
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    fn check(&self, handle: EntryHandle) -> Result<()> {
        match self.slots.get(handle.slot) {
            Some(slot) if slot.generation == handle.generation && slot.entry.is_some() => Ok(()),
            _ => Err(Error::StaleHandle(handle)),
        }
    }

    fn entry(&self, idx: usize) -> Option<&Entry<K, V>> {
        self.slots.get(idx).and_then(|slot| slot.entry.as_ref())
    }

    fn link_at_head(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(entry) = self.slots[idx].entry.as_mut() {
            entry.prev = None;
            entry.next = old_head;
        }

        match old_head {
            Some(head_idx) => {
                if let Some(head) = self.slots[head_idx].entry.as_mut() {
                    head.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.entry(idx) {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_entry) = self.slots[prev_idx].entry.as_mut() {
                    prev_entry.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_entry) = self.slots[next_idx].entry.as_mut() {
                    next_entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            self.slots.push(Slot {
                generation: 0,
                entry: None,
            });
            self.slots.len() - 1
        }
    }

    /// Take the entry out of an already unlinked slot
    fn free_slot(&mut self, idx: usize) -> Option<(K, V)> {
        let slot = &mut self.slots[idx];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(idx);
        Some((entry.key, entry.value))
    }

    #[cfg(test)]
    pub fn head(&self) -> Option<EntryHandle> {
        self.head.map(|idx| EntryHandle {
            slot: idx,
            generation: self.slots[idx].generation,
        })
    }

    #[cfg(test)]
    pub fn tail(&self) -> Option<EntryHandle> {
        self.tail.map(|idx| EntryHandle {
            slot: idx,
            generation: self.slots[idx].generation,
        })
    }

    /// Walk the links in both directions and check they agree with `len`
    #[cfg(test)]
    pub fn debug_validate(&self) {
        let mut forward = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let entry = self.entry(idx).expect("linked slot is empty");
            assert_eq!(entry.prev, prev, "broken prev link at slot {}", idx);
            prev = Some(idx);
            cursor = entry.next;
            forward += 1;
            assert!(forward <= self.len, "cycle in recency list");
        }
        assert_eq!(prev, self.tail, "tail does not match last entry");
        assert_eq!(forward, self.len);

        let occupied = self.slots.iter().filter(|slot| slot.entry.is_some()).count();
        assert_eq!(occupied, self.len);
        assert_eq!(occupied + self.free_list.len(), self.slots.len());
    }
}

/// Iterator over `(key, value)` from MRU to LRU
pub(crate) struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.list.entry(self.cursor?)?;
        self.cursor = entry.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
