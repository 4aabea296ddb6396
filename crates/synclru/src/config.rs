//! Cache construction parameters

use crate::error::{Error, Result};

/// Configuration for a [`SyncLru`](crate::SyncLru)
///
/// Capacity is fixed for the lifetime of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    capacity: usize,
    fair_unlock: bool,
}

impl CacheConfig {
    /// Create a config for a cache holding at most `capacity` entries
    ///
    /// Fair unlocking is on by default.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fair_unlock: true,
        }
    }

    /// Hand the lock straight to the longest waiter on release
    ///
    /// Turning this off lets a releasing thread barge back in ahead of
    /// queued waiters, which raises throughput under contention but lets a
    /// waiter sit behind repeated re-acquisitions.
    pub fn fair_unlock(mut self, fair: bool) -> Self {
        self.fair_unlock = fair;
        self
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether guards are released with `unlock_fair`
    pub fn is_fair(&self) -> bool {
        self.fair_unlock
    }

    /// Check the config can build a cache
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
