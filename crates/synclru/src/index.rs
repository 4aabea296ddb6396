//! Key to entry-handle index
//!
//! Thin wrapper over an AHash map. It only stores handles; the recency list
//! owns the entries themselves.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

use crate::list::EntryHandle;

/// O(1) lookup from key to the handle of its list entry
pub(crate) struct CacheIndex<K> {
    map: HashMap<K, EntryHandle, RandomState>,
}

impl<K> CacheIndex<K>
where
    K: Hash + Eq,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    pub fn lookup(&self, key: &K) -> Option<EntryHandle> {
        self.map.get(key).copied()
    }

    /// Associate `key` with `handle`, returning the handle it replaced
    pub fn insert(&mut self, key: K, handle: EntryHandle) -> Option<EntryHandle> {
        self.map.insert(key, handle)
    }

    pub fn remove(&mut self, key: &K) -> Option<EntryHandle> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
