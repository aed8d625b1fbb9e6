//! Cache store traits

use async_trait::async_trait;
use std::time::Duration;

use crate::{CacheError, CacheOptions, CacheStats, StoredEntry};

/// Core trait for all cache storage backends
///
/// Every single-key operation must be atomic on its own: a concurrent reader
/// sees either the previous entry or the new one, never a torn value.
/// Expired entries must be reported as absent.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Get a value from the cache
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<StoredEntry<Vec<u8>>>, CacheError>;

    /// Set a value in the cache, replacing any previous entry
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheOptions,
    ) -> Result<(), CacheError>;

    /// Delete a key from the cache
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Check if a live (non-expired) key exists in the cache
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Clear all entries and dependency edges
    async fn clear(&self) -> Result<(), CacheError>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Get the number of entries in the cache
    async fn len(&self) -> Result<usize, CacheError>;

    /// Check if the cache is empty
    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}

/// Extended trait for backends that record dependency edges
///
/// An edge `dependent -> target` means the entry at `dependent` is only valid
/// while the entry at `target` is. Edges are stored independently of entries,
/// so an edge may be recorded before either side is cached.
///
/// The dependents of one target form a set that expires `ttl` after the last
/// edge was added to it.
#[async_trait]
pub trait DependencyBackend: CacheBackend {
    /// Record `dependent -> target`. Recording an existing edge is a no-op
    /// apart from refreshing the expiry of the target's set.
    async fn add_dependency(
        &self,
        dependent: &str,
        target: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Keys with an edge into `target`
    async fn get_dependents(&self, target: &str) -> Result<Vec<String>, CacheError>;

    /// Forget every edge into `target`
    async fn remove_dependents(&self, target: &str) -> Result<(), CacheError>;
}

/// A store usable by the coordinator
pub trait CacheStore: CacheBackend + DependencyBackend {}

impl<T: CacheBackend + DependencyBackend> CacheStore for T {}
