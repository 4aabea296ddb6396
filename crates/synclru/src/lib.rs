//! # synclru
//!
//! Bounded, thread-safe LRU cache.
//!
//! ## Architecture
//! - **Index**: AHash map from key to entry handle (O(1))
//! - **Recency list**: arena-backed doubly linked list, MRU at the head (O(1))
//! - **Controller**: one `parking_lot::RwLock` over both; anything that
//!   reorders or evicts holds the write lock for the whole call
//!
//! ```
//! use synclru::SyncLru;
//!
//! let cache = SyncLru::new(2)?;
//! cache.put("a", 1);
//! cache.put("b", 2);
//! cache.get(&"a");
//! cache.put("c", 3); // evicts "b"
//!
//! assert!(cache.contains_key(&"a"));
//! assert!(!cache.contains_key(&"b"));
//! # Ok::<(), synclru::Error>(())
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod index;
mod list;

pub use cache::SyncLru;
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use list::EntryHandle;
