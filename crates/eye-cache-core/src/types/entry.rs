//! Stored entry record

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A value as the store keeps it, with the metadata needed for lazy expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry<T> {
    /// The stored value
    pub value: T,
    /// When the entry was written
    pub created_at: SystemTime,
    /// Time-to-live; `None` never expires
    pub ttl: Option<Duration>,
    /// Size in bytes
    pub size: usize,
}

impl<T> StoredEntry<T> {
    /// Create a new entry without expiry
    pub fn new(value: T, size: usize) -> Self {
        Self {
            value,
            created_at: SystemTime::now(),
            ttl: None,
            size,
        }
    }

    /// Create entry with TTL
    pub fn with_ttl(value: T, size: usize, ttl: Duration) -> Self {
        let mut entry = Self::new(value, size);
        entry.ttl = Some(ttl);
        entry
    }

    /// Check if entry has expired.
    ///
    /// An entry whose age reaches its TTL is expired; a clock that moved
    /// backwards keeps the entry alive.
    pub fn is_expired(&self) -> bool {
        match (self.ttl, self.created_at.elapsed()) {
            (Some(ttl), Ok(elapsed)) => elapsed >= ttl,
            _ => false,
        }
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| {
            self.created_at
                .elapsed()
                .ok()
                .and_then(|elapsed| ttl.checked_sub(elapsed))
        })
    }

    /// Get age of the entry
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    /// Replace the value, keeping the metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StoredEntry<U> {
        StoredEntry {
            value: f(self.value),
            created_at: self.created_at,
            ttl: self.ttl,
            size: self.size,
        }
    }
}
