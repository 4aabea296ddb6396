//! Concurrent invariant sampler

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use synclru::SyncLru;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleReport {
    pub samples: u64,
    pub violations: u64,
}

/// Observes the cache from outside while workers run
pub struct Sampler<K, V> {
    cache: Arc<SyncLru<K, V>>,
    done: Arc<AtomicBool>,
}

impl<K, V> Sampler<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(cache: Arc<SyncLru<K, V>>, done: Arc<AtomicBool>) -> Self {
        Self { cache, done }
    }

    /// Sample until `done` is set; always takes at least one sample
    pub fn run(&self) -> SampleReport {
        let mut report = SampleReport::default();

        loop {
            let finished = self.done.load(Ordering::Acquire);
            report.violations += self.sample();
            report.samples += 1;

            if finished {
                return report;
            }
            thread::yield_now();
        }
    }

    /// One observation; returns the number of violations seen
    pub fn sample(&self) -> u64 {
        let capacity = self.cache.capacity();
        let mut violations = 0;

        let len = self.cache.len();
        if len > capacity {
            warn!(len, capacity, "Cache size exceeds capacity");
            violations += 1;
        }

        let keys = self.cache.keys();
        if keys.len() > capacity {
            warn!(keys = keys.len(), capacity, "Recency list exceeds capacity");
            violations += 1;
        }

        let unique: HashSet<&K> = keys.iter().collect();
        if unique.len() != keys.len() {
            warn!(
                keys = keys.len(),
                unique = unique.len(),
                "Duplicate keys in recency list"
            );
            violations += 1;
        }

        violations
    }
}

/// Quiescent check: list and index agree exactly
pub fn check_settled<K, V>(cache: &SyncLru<K, V>) -> u64
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    let keys = cache.keys();
    let mut violations = 0;

    if keys.len() != cache.len() {
        warn!(
            keys = keys.len(),
            len = cache.len(),
            "Recency list and index disagree on size"
        );
        violations += 1;
    }

    let missing = keys.iter().filter(|key| !cache.contains_key(key)).count();
    if missing > 0 {
        warn!(missing, "Listed keys missing from index");
        violations += 1;
    }

    violations
}
