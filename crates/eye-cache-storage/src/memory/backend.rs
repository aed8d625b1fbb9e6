//! In-memory cache backend using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use eye_cache_core::{
    CacheBackend, CacheOptions, CacheStats, DependencyBackend, Result, StoredEntry,
};

/// Configuration for the memory backend
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct MemoryStats {
    hits: u64,
    misses: u64,
    writes: u64,
    deletes: u64,
    evictions: u64,
}

/// Keys depending on one target
#[derive(Debug, Default)]
struct DependentSet {
    keys: HashSet<String>,
    expires_at: Option<Instant>,
}

impl DependentSet {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// target key -> keys that depend on it
type DependencyIndex = DashMap<String, DependentSet>;

/// In-memory cache backend
///
/// Entries live in a `DashMap`, so every single-key operation holds the shard
/// lock for its duration. Expiry is checked lazily on read.
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryBackend {
    /// Main data store
    data: Arc<DashMap<String, StoredEntry<Vec<u8>>>>,
    /// Dependency edges, indexed by the depended-on key
    dependents: Arc<DependencyIndex>,
    /// Statistics
    stats: Arc<RwLock<MemoryStats>>,
    /// Configuration
    config: MemoryConfig,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            dependents: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Make room for one more entry if at capacity.
    ///
    /// Expired entries go first; only when none are left are live entries
    /// dropped.
    fn maybe_evict(&self, incoming: &str) {
        if self.config.max_capacity == 0
            || self.data.len() < self.config.max_capacity
            || self.data.contains_key(incoming)
        {
            return;
        }

        if self.purge_expired() > 0 && self.data.len() < self.config.max_capacity {
            return;
        }

        let excess = self.data.len() + 1 - self.config.max_capacity;
        let keys_to_remove: Vec<String> = self
            .data
            .iter()
            .take(excess)
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys_to_remove {
            if self.data.remove(&key).is_some() {
                self.stats.write().evictions += 1;
            }
        }
    }

    /// Remove every expired entry and return how many were dropped.
    ///
    /// Expired dependency sets are dropped too.
    pub fn purge_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        self.dependents.retain(|_, deps| !deps.is_expired());
        let removed = before.saturating_sub(self.data.len());
        self.stats.write().evictions += removed as u64;
        removed
    }

    /// Get approximate memory usage
    pub fn memory_usage(&self) -> usize {
        self.data
            .iter()
            .map(|entry| entry.size + entry.key().len())
            .sum()
    }

    fn dependency_edge_count(&self) -> usize {
        self.dependents
            .iter()
            .filter(|deps| !deps.is_expired())
            .map(|deps| deps.keys.len())
            .sum()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry<Vec<u8>>>> {
        // Expired entries are removed under the shard lock so a concurrent
        // `set` of a fresh value is never dropped by mistake.
        if self
            .data
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            let mut stats = self.stats.write();
            stats.evictions += 1;
            stats.misses += 1;
            return Ok(None);
        }

        match self.data.get(key) {
            Some(entry) => {
                self.stats.write().hits += 1;
                Ok(Some(entry.value().clone()))
            }
            None => {
                self.stats.write().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<()> {
        self.maybe_evict(key);

        let size = value.len();
        let entry = StoredEntry {
            value,
            created_at: SystemTime::now(),
            ttl: options.ttl,
            size,
        };

        self.data.insert(key.to_string(), entry);
        self.stats.write().writes += 1;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.data.remove(key) {
            Some((_, entry)) => {
                self.stats.write().deletes += 1;
                Ok(!entry.is_expired())
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.data.get(key) {
            Some(entry) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.data.clear();
        self.dependents.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let stats = self.stats.read();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            deletes: stats.deletes,
            evictions: stats.evictions,
            dependency_edges: self.dependency_edge_count(),
            size: self.data.len(),
            memory_bytes: self.memory_usage(),
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}

#[async_trait]
impl DependencyBackend for MemoryBackend {
    async fn add_dependency(
        &self,
        dependent: &str,
        target: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut deps = self.dependents.entry(target.to_string()).or_default();
        if deps.is_expired() {
            deps.keys.clear();
        }
        deps.keys.insert(dependent.to_string());
        deps.expires_at = ttl.map(|ttl| Instant::now() + ttl);
        Ok(())
    }

    async fn get_dependents(&self, target: &str) -> Result<Vec<String>> {
        Ok(self
            .dependents
            .get(target)
            .filter(|deps| !deps.is_expired())
            .map(|deps| deps.keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_dependents(&self, target: &str) -> Result<()> {
        self.dependents.remove(target);
        Ok(())
    }
}
