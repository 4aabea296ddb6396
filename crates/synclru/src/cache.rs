//! SyncLru: thread-safe LRU cache
//!
//! The index and the recency list sit behind a single `RwLock` and are only
//! ever mutated together under the write lock. `get` refreshes recency, so it
//! takes the write lock for the whole call, the same as `put`. Only
//! `contains_key`, `len`, `is_empty`, `peek` and `keys` share the read lock.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::index::CacheIndex;
use crate::list::RecencyList;

/// Entries allocated up front; larger caches grow as entries arrive
const PREALLOC_LIMIT: usize = 1024;

/// Index plus recency list; one is never changed without the other
struct LruState<K, V> {
    index: CacheIndex<K>,
    list: RecencyList<K, V>,
    capacity: usize,

    /// Exclusive operations in commit order
    #[cfg(test)]
    journal: Vec<JournalOp<K, V>>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
enum JournalOp<K, V> {
    Get(K, Option<V>),
    Put(K, V),
}

impl<K, V> LruState<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn new(capacity: usize) -> Self {
        let prealloc = capacity.min(PREALLOC_LIMIT);
        Self {
            index: CacheIndex::with_capacity(prealloc),
            list: RecencyList::with_capacity(prealloc),
            capacity,
            #[cfg(test)]
            journal: Vec::new(),
        }
    }

    /// Look up `key` and make it the most recently used entry
    fn touch(&mut self, key: &K) -> Result<Option<V>> {
        let value = match self.index.lookup(key) {
            Some(handle) => {
                self.list.move_to_head(handle)?;
                Some(self.list.value(handle)?.clone())
            }
            None => None,
        };

        #[cfg(test)]
        self.journal.push(JournalOp::Get(key.clone(), value.clone()));

        Ok(value)
    }

    /// Insert or update `key`, returning the entry evicted to make room
    fn insert(&mut self, key: K, value: V) -> Result<Option<(K, V)>> {
        #[cfg(test)]
        self.journal.push(JournalOp::Put(key.clone(), value.clone()));

        if let Some(handle) = self.index.lookup(&key) {
            *self.list.value_mut(handle)? = value;
            self.list.move_to_head(handle)?;
            return Ok(None);
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_lru()?
        } else {
            None
        };

        let handle = self.list.insert_at_head(key.clone(), value);
        if self.index.insert(key, handle).is_some() {
            return Err(Error::OutOfSync("new key already indexed"));
        }

        Ok(evicted)
    }

    /// Drop the tail from the list and its key from the index
    fn evict_lru(&mut self) -> Result<Option<(K, V)>> {
        let (key, value) = match self.list.evict_tail() {
            Some(pair) => pair,
            None => return Ok(None),
        };

        if self.index.remove(&key).is_none() {
            return Err(Error::OutOfSync("evicted key missing from index"));
        }

        trace!(capacity = self.capacity, "Evicted least recently used entry");
        Ok(Some((key, value)))
    }

    fn peek(&self, key: &K) -> Result<Option<V>> {
        self.index
            .lookup(key)
            .map(|handle| self.list.value(handle).cloned())
            .transpose()
    }

    fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.list.len());
        keys.extend(self.list.iter().map(|(key, _)| key.clone()));
        keys
    }

    /// Check index and list are in lock-step and within capacity
    #[cfg(test)]
    fn debug_validate(&self) {
        self.list.debug_validate();
        assert_eq!(self.index.len(), self.list.len());
        assert!(self.list.len() <= self.capacity);

        for (key, value) in self.list.iter() {
            let handle = self.index.lookup(key).expect("listed key missing from index");
            let indexed = self.list.value(handle).expect("index holds stale handle");
            assert!(std::ptr::eq(indexed, value), "index points at the wrong entry");
        }
    }
}

/// Thread-safe, fixed-capacity LRU cache
///
/// Share between threads with `Arc<SyncLru<K, V>>`. Every call is a single
/// linearizable step against the combined index and recency list.
///
/// # Panics
///
/// `get`, `put`, `peek` panic if the cache detects that its own index and
/// recency list have diverged. That is a bug in this crate, never a result
/// of how the cache is called.
pub struct SyncLru<K, V> {
    state: RwLock<LruState<K, V>>,
    config: CacheConfig,
}

impl<K, V> SyncLru<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries, must be greater than 0
    ///
    /// # Returns
    /// * `Result<SyncLru>` - `Error::InvalidConfiguration` for a zero capacity
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(CacheConfig::new(capacity))
    }

    /// Create a cache from a full config
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            capacity = config.capacity(),
            fair_unlock = config.is_fair(),
            "Created LRU cache"
        );

        Ok(Self {
            state: RwLock::new(LruState::new(config.capacity())),
            config,
        })
    }

    /// Get a value and mark it most recently used
    ///
    /// Takes exclusive access even on a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.write();
        let result = state.touch(key);
        self.release_write(state);
        result.unwrap_or_else(|err| bookkeeping_defect(err))
    }

    /// Insert or overwrite a value, evicting the LRU entry when full
    pub fn put(&self, key: K, value: V) {
        let mut state = self.state.write();
        let result = state.insert(key, value);
        self.release_write(state);
        if let Err(err) = result {
            bookkeeping_defect(err);
        }
    }

    /// Like [`get`](Self::get), giving up if exclusive access takes longer
    /// than `timeout`
    ///
    /// # Returns
    /// * `Result<Option<V>>` - `Error::LockTimeout` leaves the cache untouched
    pub fn try_get_for(&self, key: &K, timeout: Duration) -> Result<Option<V>> {
        let mut state = self
            .state
            .try_write_for(timeout)
            .ok_or(Error::LockTimeout(timeout))?;
        let result = state.touch(key);
        self.release_write(state);
        result
    }

    /// Like [`put`](Self::put), giving up if exclusive access takes longer
    /// than `timeout`
    pub fn try_put_for(&self, key: K, value: V, timeout: Duration) -> Result<()> {
        let mut state = self
            .state
            .try_write_for(timeout)
            .ok_or(Error::LockTimeout(timeout))?;
        let result = state.insert(key, value);
        self.release_write(state);
        result.map(|_| ())
    }

    /// Read a value without refreshing its recency
    ///
    /// Unlike [`get`](Self::get) this leaves eviction order alone, so a key
    /// that is only ever peeked still ages out.
    pub fn peek(&self, key: &K) -> Option<V> {
        let state = self.state.read();
        let result = state.peek(key);
        self.release_read(state);
        result.unwrap_or_else(|err| bookkeeping_defect(err))
    }

    /// Check whether a key is cached, without refreshing its recency
    pub fn contains_key(&self, key: &K) -> bool {
        let state = self.state.read();
        let found = state.index.contains(key);
        self.release_read(state);
        found
    }

    /// Get the number of cached entries
    pub fn len(&self) -> usize {
        let state = self.state.read();
        let len = state.index.len();
        self.release_read(state);
        len
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        let empty = state.list.is_empty();
        self.release_read(state);
        empty
    }

    /// Snapshot of the cached keys, most recently used first
    pub fn keys(&self) -> Vec<K> {
        let state = self.state.read();
        let keys = state.keys();
        self.release_read(state);
        keys
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Get the config the cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn release_write(&self, guard: RwLockWriteGuard<'_, LruState<K, V>>) {
        if self.config.is_fair() {
            RwLockWriteGuard::unlock_fair(guard);
        } else {
            drop(guard);
        }
    }

    fn release_read(&self, guard: RwLockReadGuard<'_, LruState<K, V>>) {
        if self.config.is_fair() {
            RwLockReadGuard::unlock_fair(guard);
        } else {
            drop(guard);
        }
    }

    #[cfg(test)]
    fn take_journal(&self) -> Vec<JournalOp<K, V>> {
        std::mem::take(&mut self.state.write().journal)
    }
}

impl<K, V> fmt::Debug for SyncLru<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLru")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("fair_unlock", &self.config.is_fair())
            .finish()
    }
}

fn bookkeeping_defect(err: Error) -> ! {
    error!(%err, "LRU bookkeeping invariant violated");
    panic!("LRU bookkeeping invariant violated: {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    /// Single-threaded model: front = MRU, back = LRU
    struct ReferenceLru {
        capacity: usize,
        order: VecDeque<(u32, u64)>,
    }

    impl ReferenceLru {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                order: VecDeque::new(),
            }
        }

        fn get(&mut self, key: u32) -> Option<u64> {
            let pos = self.order.iter().position(|(k, _)| *k == key)?;
            let entry = self.order.remove(pos)?;
            self.order.push_front(entry);
            Some(entry.1)
        }

        fn peek(&self, key: u32) -> Option<u64> {
            self.order.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
        }

        fn put(&mut self, key: u32, value: u64) {
            if let Some(pos) = self.order.iter().position(|(k, _)| *k == key) {
                self.order.remove(pos);
            } else if self.order.len() >= self.capacity {
                self.order.pop_back();
            }
            self.order.push_front((key, value));
        }

        fn keys(&self) -> Vec<u32> {
            self.order.iter().map(|(k, _)| *k).collect()
        }
    }

    #[test]
    fn test_new_rejects_zero_capacity() {
        let result = SyncLru::<u32, u32>::new(0);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_cache_basic() {
        let cache = SyncLru::new(2).unwrap();

        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_evicts_first_inserted() {
        let cache = SyncLru::new(3).unwrap();

        for key in 0..4 {
            cache.put(key, key * 10);
        }

        assert!(!cache.contains_key(&0));
        for key in 1..4 {
            assert!(cache.contains_key(&key));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = SyncLru::new(2).unwrap();

        cache.put("A", 1);
        cache.put("B", 2);
        cache.get(&"A");
        cache.put("C", 3); // Should evict B

        assert!(cache.contains_key(&"A"));
        assert!(!cache.contains_key(&"B"));
        assert!(cache.contains_key(&"C"));
    }

    #[test]
    fn test_update_in_place() {
        let cache = SyncLru::new(2).unwrap();

        cache.put("A", 1);
        assert_eq!(cache.len(), 1);
        cache.put("A", 2); // Overwrite

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"A"), Some(2));
    }

    #[test]
    fn test_update_refreshes_recency() {
        let cache = SyncLru::new(2).unwrap();

        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("A", 3);
        cache.put("C", 4); // Should evict B

        assert_eq!(cache.keys(), vec!["C", "A"]);
    }

    #[test]
    fn test_idempotent_miss() {
        let cache: SyncLru<&str, i32> = SyncLru::new(4).unwrap();

        for _ in 0..3 {
            assert_eq!(cache.get(&"X"), None);
        }
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let cache = SyncLru::new(2).unwrap();

        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.peek(&"A"), Some(1));
        cache.put("C", 3); // A is still LRU

        assert!(!cache.contains_key(&"A"));
        assert_eq!(cache.peek(&"A"), None);
        assert_eq!(cache.keys(), vec!["C", "B"]);
    }

    #[test]
    fn test_keys_in_recency_order() {
        let cache = SyncLru::new(3).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(3, "c");
        assert_eq!(cache.keys(), vec![3, 2, 1]);

        cache.get(&1);
        assert_eq!(cache.keys(), vec![1, 3, 2]);
    }

    #[test]
    fn test_unfair_config() {
        let cache = SyncLru::with_config(CacheConfig::new(2).fair_unlock(false)).unwrap();

        cache.put(1, 1);
        cache.put(2, 2);
        cache.put(3, 3);

        assert!(!cache.config().is_fair());
        assert_eq!(cache.keys(), vec![3, 2]);
    }

    #[test]
    fn test_try_ops_time_out_without_mutation() {
        let cache = SyncLru::new(2).unwrap();
        cache.put(1, "a");

        let timeout = Duration::from_millis(20);
        {
            let _held = cache.state.read();
            assert_eq!(
                cache.try_put_for(2, "b", timeout),
                Err(Error::LockTimeout(timeout))
            );
            assert_eq!(
                cache.try_get_for(&1, timeout),
                Err(Error::LockTimeout(timeout))
            );
        }

        assert_eq!(cache.keys(), vec![1]);
        assert!(cache.try_put_for(2, "b", timeout).is_ok());
        assert_eq!(cache.try_get_for(&1, timeout), Ok(Some("a")));
        assert_eq!(cache.keys(), vec![1, 2]);
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let cache = SyncLru::new(usize::MAX).unwrap();

        for key in 0..10u64 {
            cache.put(key, key * 2);
        }

        assert_eq!(cache.capacity(), usize::MAX);
        assert_eq!(cache.get(&3), Some(6));
        assert_eq!(cache.len(), 10);
        cache.state.read().debug_validate();
    }

    #[test]
    fn test_reads_share_the_lock() {
        let cache = Arc::new(SyncLru::new(4).unwrap());
        cache.put(1, "a");
        cache.put(2, "b");

        let held = cache.state.read();

        let (tx, rx) = mpsc::channel();
        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let seen = (
                    cache.contains_key(&1),
                    cache.contains_key(&3),
                    cache.len(),
                    cache.keys(),
                    cache.peek(&2),
                );
                tx.send(seen).unwrap();
            })
        };

        // Shared-mode calls finish while another reader still holds the lock
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, (true, false, 2, vec![2, 1], Some("b")));
        reader.join().unwrap();

        // Exclusive access is still refused
        let timeout = Duration::from_millis(20);
        assert_eq!(
            cache.try_put_for(3, "c", timeout),
            Err(Error::LockTimeout(timeout))
        );
        drop(held);

        assert_eq!(cache.keys(), vec![2, 1]);
    }

    #[test]
    fn test_debug_output() {
        let cache = SyncLru::new(4).unwrap();
        cache.put(1, 1);

        let out = format!("{:?}", cache);
        assert!(out.contains("capacity: 4"));
        assert!(out.contains("len: 1"));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(SyncLru::new(50).unwrap());
        let mut handles = vec![];

        for i in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..1000u32 {
                    cache.put(j % 100, i);
                    cache.get(&(j % 100));
                    assert!(cache.len() <= 50);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 50);
        cache.state.read().debug_validate();
    }

    #[test]
    fn test_concurrent_linearizable() {
        const THREADS: u64 = 8;
        const OPS: u64 = 2000;

        let cache = Arc::new(SyncLru::new(8).unwrap());
        let mut handles = vec![];

        for t in 0..THREADS {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..OPS {
                    let key = ((t * 7 + i * 13) % 16) as u32;
                    if i % 3 == 0 {
                        cache.put(key, t * OPS + i);
                    } else {
                        cache.get(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Replay the commit order through the model; every result must agree
        let journal = cache.take_journal();
        assert_eq!(journal.len() as u64, THREADS * OPS);

        let mut model = ReferenceLru::new(8);
        for op in journal {
            match op {
                JournalOp::Put(key, value) => model.put(key, value),
                JournalOp::Get(key, seen) => assert_eq!(model.get(key), seen),
            }
        }

        assert_eq!(cache.keys(), model.keys());
        for key in 0..16 {
            assert_eq!(cache.contains_key(&key), model.peek(key).is_some());
        }
    }

    #[test]
    fn test_no_torn_state() {
        let cache = Arc::new(SyncLru::new(16).unwrap());
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..5000u64 {
                        let key = ((i * 31 + t) % 64) as u32;
                        cache.put(key, i);
                        cache.get(&((key + 1) % 64));
                    }
                })
            })
            .collect();

        let samplers: Vec<_> = (0..2)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut samples = 0;
                    while !done.load(Ordering::Acquire) || samples == 0 {
                        assert!(cache.len() <= 16);

                        let keys = cache.keys();
                        assert!(keys.len() <= 16);
                        let unique: HashSet<_> = keys.iter().collect();
                        assert_eq!(unique.len(), keys.len());

                        cache.state.read().debug_validate();
                        samples += 1;
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        for sampler in samplers {
            sampler.join().unwrap();
        }

        assert_eq!(cache.len(), 16);
    }

    #[derive(Debug, Clone)]
    enum Operation {
        Get(u32),
        Put(u32, u64),
        Peek(u32),
    }

    fn operation_strategy() -> impl Strategy<Value = Operation> {
        prop_oneof![
            (0u32..40).prop_map(Operation::Get),
            (0u32..40, any::<u64>()).prop_map(|(k, v)| Operation::Put(k, v)),
            (0u32..40).prop_map(Operation::Peek),
        ]
    }

    proptest! {
        /// len() never exceeds capacity.
        #[test]
        fn prop_len_within_capacity(
            capacity in 1usize..32,
            ops in prop::collection::vec((0u32..100, any::<u64>()), 0..200)
        ) {
            let cache = SyncLru::new(capacity).unwrap();
            for (key, value) in ops {
                cache.put(key, value);
                prop_assert!(cache.len() <= cache.capacity());
            }
        }

        /// Arbitrary operation sequences match the model and keep the
        /// index in lock-step with the list.
        #[test]
        fn prop_matches_reference(
            capacity in 1usize..16,
            ops in prop::collection::vec(operation_strategy(), 0..200)
        ) {
            let cache = SyncLru::new(capacity).unwrap();
            let mut model = ReferenceLru::new(capacity);

            for op in ops {
                match op {
                    Operation::Get(k) => {
                        prop_assert_eq!(cache.get(&k), model.get(k));
                    }
                    Operation::Put(k, v) => {
                        cache.put(k, v);
                        model.put(k, v);
                    }
                    Operation::Peek(k) => {
                        prop_assert_eq!(cache.peek(&k), model.peek(k));
                    }
                }
                cache.state.read().debug_validate();
            }

            let keys = cache.keys();
            prop_assert_eq!(&keys, &model.keys());
            for key in 0..40 {
                prop_assert_eq!(cache.contains_key(&key), keys.contains(&key));
            }
        }
    }
}
