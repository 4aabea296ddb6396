//! Stress worker issuing a seeded random get/put mix

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use synclru::{Error, Result, SyncLru};

/// Value stored by the workers; records which key it was written under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub key: u64,
    pub writer: u64,
    pub seq: u64,
}

/// Shape of the load each worker generates
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub ops: u64,
    pub keys: u64,
    pub read_ratio: f64,
    pub timeout: Option<Duration>,
}

/// Per-worker outcome counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub timeouts: u64,
    /// Hits returning a value written under a different key
    pub mismatches: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.puts += other.puts;
        self.timeouts += other.timeouts;
        self.mismatches += other.mismatches;
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.puts + self.timeouts
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

pub struct Worker {
    id: u64,
    cache: Arc<SyncLru<u64, Stamp>>,
    rng: StdRng,
    workload: Workload,
}

impl Worker {
    pub fn new(id: u64, cache: Arc<SyncLru<u64, Stamp>>, seed: u64, workload: Workload) -> Self {
        Self {
            id,
            cache,
            rng: StdRng::seed_from_u64(seed.wrapping_add(id)),
            workload,
        }
    }

    pub fn run(mut self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();

        for seq in 0..self.workload.ops {
            let key = self.rng.gen_range(0..self.workload.keys);

            if self.rng.gen_bool(self.workload.read_ratio) {
                match self.get(key) {
                    Ok(Some(stamp)) if stamp.key == key => stats.hits += 1,
                    Ok(Some(_)) => {
                        stats.hits += 1;
                        stats.mismatches += 1;
                    }
                    Ok(None) => stats.misses += 1,
                    Err(Error::LockTimeout(_)) => stats.timeouts += 1,
                    Err(err) => return Err(err),
                }
            } else {
                let stamp = Stamp {
                    key,
                    writer: self.id,
                    seq,
                };
                match self.put(key, stamp) {
                    Ok(()) => stats.puts += 1,
                    Err(Error::LockTimeout(_)) => stats.timeouts += 1,
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(stats)
    }

    fn get(&self, key: u64) -> Result<Option<Stamp>> {
        match self.workload.timeout {
            Some(timeout) => self.cache.try_get_for(&key, timeout),
            None => Ok(self.cache.get(&key)),
        }
    }

    fn put(&self, key: u64, stamp: Stamp) -> Result<()> {
        match self.workload.timeout {
            Some(timeout) => self.cache.try_put_for(key, stamp, timeout),
            None => {
                self.cache.put(key, stamp);
                Ok(())
            }
        }
    }
}
