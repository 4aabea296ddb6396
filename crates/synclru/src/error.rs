//! Error types for synclru

use std::fmt;
use std::time::Duration;

use crate::list::EntryHandle;

/// Result type alias for synclru operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cache configuration rejected at construction
    InvalidConfiguration(String),

    /// Handle does not name a live list entry (internal bookkeeping bug)
    StaleHandle(EntryHandle),

    /// Index and recency list disagree (internal bookkeeping bug)
    OutOfSync(&'static str),

    /// Exclusive access not obtained within the given timeout
    LockTimeout(Duration),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::StaleHandle(handle) => write!(f, "Stale entry handle: {}", handle),
            Error::OutOfSync(msg) => write!(f, "Index and recency list out of sync: {}", msg),
            Error::LockTimeout(timeout) => {
                write!(f, "Lock not acquired within {} ms", timeout.as_millis())
            }
        }
    }
}

impl std::error::Error for Error {}
