//! Read-through / write-through cache coordinator
//!
//! Sits between the client facade and the store: looks entries up (resolving
//! aliases), populates the store after a remote fetch, and applies
//! invalidation plans after successful mutations. Store failures never reach
//! the caller; they are logged and treated as a miss or a skipped write.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use eye_cache_core::{
    CacheError, CacheMetrics, CacheOperation, CacheOptions, CacheStats, CacheStore,
    JsonSerializer, NoopMetrics, Serializer,
};

use crate::error::Result;
use crate::keys::CacheKey;

mod coalescer;
mod graph;
mod invalidation;

pub use coalescer::Coalescer;
pub use graph::DependencyGraph;
pub use invalidation::{InvalidationPlan, Mutation};

/// Configuration for CacheCoordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Lifetime of every populated entry
    pub ttl: Duration,
    /// Prefix for all store keys, for stores shared between applications
    pub namespace: Option<String>,
    /// TTL jitter fraction (0.0 - 1.0) added on top of `ttl`
    pub ttl_jitter: f64,
    /// Share one remote call between concurrent misses on the same key
    pub single_flight: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            namespace: None,
            ttl_jitter: 0.0,
            single_flight: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create config with specific TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    /// Create config with namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set TTL jitter, clamped to 0.0 - 1.0
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.ttl_jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Enable single-flight for misses
    pub fn single_flight(mut self) -> Self {
        self.single_flight = true;
        self
    }
}

/// What the store holds under a key: an entity, or the key of one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CacheEntry<T> {
    Value(T),
    Alias(CacheKey),
}

/// Where a freshly fetched entity goes
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub primary: CacheKey,
    /// Alias keys pointing at `primary`
    pub aliases: Vec<CacheKey>,
    /// `(dependent, target)` edges implied by the entity
    pub links: Vec<(CacheKey, CacheKey)>,
}

impl Placement {
    pub fn new(primary: CacheKey) -> Self {
        Self {
            primary,
            aliases: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Add an alias; duplicates and the primary key itself are ignored
    pub fn alias(mut self, key: CacheKey) -> Self {
        if key != self.primary && !self.aliases.contains(&key) {
            self.aliases.push(key);
        }
        self
    }

    pub fn link(mut self, dependent: CacheKey, target: CacheKey) -> Self {
        if !self.links.contains(&(dependent.clone(), target.clone())) {
            self.links.push((dependent, target));
        }
        self
    }
}

/// Longest TTL an entry can get, jitter included
fn max_entry_ttl(config: &CoordinatorConfig) -> Duration {
    let jitter = config.ttl.as_millis() as f64 * config.ttl_jitter.clamp(0.0, 1.0);
    config
        .ttl
        .saturating_add(Duration::from_millis(jitter as u64))
}

/// Cache coordinator with pluggable store, serializer and metrics
///
/// Generic over:
/// - `B`: The store (Memory, Redis)
/// - `S`: The serializer
/// - `M`: The metrics collector
pub struct CacheCoordinator<B, S = JsonSerializer, M = NoopMetrics>
where
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    backend: Arc<B>,
    serializer: Arc<S>,
    metrics: Arc<M>,
    config: CoordinatorConfig,
    graph: DependencyGraph<B, M>,
    coalescer: Coalescer,
}

// Constructors for default serializer/metrics
impl<B: CacheStore> CacheCoordinator<B, JsonSerializer, NoopMetrics> {
    /// Create a coordinator with default JSON serializer and no metrics
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, CoordinatorConfig::default())
    }

    /// Create with custom config
    pub fn with_config(backend: B, config: CoordinatorConfig) -> Self {
        Self::with_serializer_and_metrics(backend, JsonSerializer, NoopMetrics, config)
    }
}

impl<B, S, M> CacheCoordinator<B, S, M>
where
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Create a coordinator with custom serializer and metrics
    pub fn with_serializer_and_metrics(
        backend: B,
        serializer: S,
        metrics: M,
        config: CoordinatorConfig,
    ) -> Self {
        let backend = Arc::new(backend);
        let metrics = Arc::new(metrics);
        let graph = DependencyGraph::new(backend.clone(), metrics.clone())
            .with_edge_ttl(max_entry_ttl(&config));
        Self {
            graph,
            backend,
            serializer: Arc::new(serializer),
            metrics,
            config,
            coalescer: Coalescer::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The underlying store
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn graph(&self) -> &DependencyGraph<B, M> {
        &self.graph
    }

    /// Store key for `key`, with namespace prefix
    pub fn store_key(&self, key: &CacheKey) -> String {
        match &self.config.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    /// Apply TTL jitter to spread expiry of entries populated together
    fn apply_ttl_jitter(&self, ttl: Duration) -> Duration {
        if self.config.ttl_jitter > 0.0 {
            let jitter_range = (ttl.as_millis() as f64 * self.config.ttl_jitter) as u64;
            if jitter_range > 0 {
                let jitter = rand::random::<u64>() % jitter_range;
                return ttl + Duration::from_millis(jitter);
            }
        }
        ttl
    }

    /// Read one stored entry; any store or decode failure is a miss
    async fn read_entry<T>(&self, store_key: &str) -> Option<CacheEntry<T>>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let stored = match self.backend.get(store_key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = store_key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        self.metrics
            .record_latency(CacheOperation::Get, start.elapsed());

        let stored = stored?;
        let start = Instant::now();
        let decoded = self.serializer.deserialize::<CacheEntry<T>>(&stored.value);
        self.metrics
            .record_latency(CacheOperation::Deserialize, start.elapsed());

        match decoded {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = store_key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Look `key` up, following an alias to its primary key.
    ///
    /// An alias whose target is gone is a miss.
    pub async fn lookup<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let store_key = self.store_key(key);

        let value = match self.read_entry::<T>(&store_key).await {
            Some(CacheEntry::Value(value)) => Some(value),
            Some(CacheEntry::Alias(target)) if key.is_alias() && !target.is_alias() => {
                match self.read_entry::<T>(&self.store_key(&target)).await {
                    Some(CacheEntry::Value(value)) => Some(value),
                    _ => {
                        debug!(key = %store_key, target = %target, "alias target gone");
                        None
                    }
                }
            }
            Some(CacheEntry::Alias(target)) => {
                warn!(key = %store_key, target = %target, "unexpected alias entry");
                None
            }
            None => None,
        };

        match value {
            Some(_) => self.metrics.record_hit(&store_key),
            None => self.metrics.record_miss(&store_key),
        }
        value
    }

    /// [`lookup`](Self::lookup) that drops `key` when `accept` rejects the
    /// cached value
    pub async fn lookup_matching<T, A>(&self, key: &CacheKey, accept: A) -> Option<T>
    where
        T: DeserializeOwned,
        A: FnOnce(&T) -> bool,
    {
        let value = self.lookup::<T>(key).await?;
        if accept(&value) {
            return Some(value);
        }
        debug!(key = %key, "cached entry no longer matches its key, dropping");
        self.invalidate(key).await;
        None
    }

    async fn write<T>(&self, key: &CacheKey, entry: &CacheEntry<T>, ttl: Duration) -> bool
    where
        T: Serialize,
    {
        let store_key = self.store_key(key);

        let start = Instant::now();
        let bytes = match self.serializer.serialize(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %store_key, error = %e, "failed to encode cache entry");
                return false;
            }
        };
        self.metrics
            .record_latency(CacheOperation::Serialize, start.elapsed());

        let options = CacheOptions::with_ttl(ttl);
        let start = Instant::now();
        let written = self.backend.set(&store_key, bytes, &options).await;
        self.metrics
            .record_latency(CacheOperation::Set, start.elapsed());

        match written {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %store_key, error = %e, "cache write failed, skipping population");
                false
            }
        }
    }

    /// Store `value` under its primary key, then its aliases, then record
    /// its edges. A failed primary write skips the rest.
    pub async fn store<T>(&self, placement: &Placement, value: &T)
    where
        T: Serialize,
    {
        let ttl = self.apply_ttl_jitter(self.config.ttl);

        if !self
            .write(&placement.primary, &CacheEntry::Value(value), ttl)
            .await
        {
            return;
        }

        let alias = CacheEntry::<()>::Alias(placement.primary.clone());
        for key in &placement.aliases {
            self.write(key, &alias, ttl).await;
        }

        for (dependent, target) in &placement.links {
            self.graph
                .link(&self.store_key(dependent), &self.store_key(target))
                .await;
        }

        debug!(
            key = %placement.primary,
            aliases = placement.aliases.len(),
            links = placement.links.len(),
            "cache populated"
        );
    }

    /// Serve `key` from the store, or fetch it and populate the store.
    ///
    /// `place` decides where the fetched value is stored; it usually derives
    /// aliases and edges from the value itself.
    pub async fn read_through<T, F, Fut, P>(&self, key: &CacheKey, fetch: F, place: P) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> Placement,
    {
        self.read_through_matching(key, |_| true, fetch, place).await
    }

    /// Like [`read_through`](Self::read_through), but a cached value that
    /// `accept` rejects is dropped from `key` and fetched again.
    ///
    /// Alias lookups use this to notice that the entity an alias points at
    /// no longer carries the aliased attribute.
    pub async fn read_through_matching<T, A, F, Fut, P>(
        &self,
        key: &CacheKey,
        accept: A,
        fetch: F,
        place: P,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        A: FnOnce(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> Placement,
    {
        if let Some(value) = self.lookup_matching(key, accept).await {
            debug!(key = %key, "served from cache");
            return Ok(value);
        }

        let load = || async {
            let start = Instant::now();
            let value = fetch().await?;
            self.metrics
                .record_latency(CacheOperation::Remote, start.elapsed());
            self.store(&place(&value), &value).await;
            Ok(value)
        };

        if self.config.single_flight {
            self.coalescer.run(&self.store_key(key), load).await
        } else {
            load().await
        }
    }

    /// Drop `key` and everything depending on it; returns the number of
    /// entries removed
    pub async fn invalidate(&self, key: &CacheKey) -> u64 {
        self.graph.invalidate(&self.store_key(key)).await
    }

    /// Record `dependent -> target`
    pub async fn link(&self, dependent: &CacheKey, target: &CacheKey) {
        self.graph
            .link(&self.store_key(dependent), &self.store_key(target))
            .await;
    }

    /// Apply the invalidation plan of a successful mutation.
    ///
    /// Drops come first, then links. Returns the number of entries removed.
    pub async fn apply(&self, mutation: &Mutation) -> u64 {
        let plan = mutation.plan();
        if plan.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for key in &plan.drop {
            removed += self.invalidate(key).await;
        }
        for (dependent, target) in &plan.link {
            self.link(dependent, target).await;
        }

        debug!(
            mutation = mutation.name(),
            removed,
            links = plan.link.len(),
            "invalidation applied"
        );
        removed
    }

    /// Check whether a live entry exists at `key` (aliases are not followed)
    pub async fn contains(&self, key: &CacheKey) -> bool {
        match self.backend.exists(&self.store_key(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %key, error = %e, "cache exists check failed");
                false
            }
        }
    }

    /// Clear all entries and edges
    pub async fn clear(&self) -> std::result::Result<(), CacheError> {
        self.backend.clear().await
    }

    /// Get store statistics
    pub async fn stats(&self) -> std::result::Result<CacheStats, CacheError> {
        self.backend.stats().await
    }
}

impl<B, S, M> Clone for CacheCoordinator<B, S, M>
where
    B: CacheStore,
    S: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            serializer: self.serializer.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            graph: self.graph.clone(),
            coalescer: self.coalescer.clone(),
        }
    }
}
