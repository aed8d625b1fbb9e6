//! Dependency graph over store keys

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eye_cache_core::{CacheMetrics, CacheOperation, CacheStore, EvictionReason};
use tracing::warn;

/// Edge registry layered on the store.
///
/// Edges live in the store next to the entries. Neither operation fails:
/// store errors are logged and the walk carries on with what it could read.
/// Edges into a key are forgotten once that key is invalidated; readers
/// record them again when they repopulate.
pub struct DependencyGraph<B, M> {
    backend: Arc<B>,
    metrics: Arc<M>,
    edge_ttl: Option<Duration>,
}

impl<B, M> DependencyGraph<B, M>
where
    B: CacheStore,
    M: CacheMetrics,
{
    pub fn new(backend: Arc<B>, metrics: Arc<M>) -> Self {
        Self {
            backend,
            metrics,
            edge_ttl: None,
        }
    }

    /// Let edges expire `ttl` after they were last recorded
    pub fn with_edge_ttl(mut self, ttl: Duration) -> Self {
        self.edge_ttl = Some(ttl);
        self
    }

    /// Record that `dependent` is only valid while `target` is
    pub async fn link(&self, dependent: &str, target: &str) {
        let start = Instant::now();
        if let Err(e) = self
            .backend
            .add_dependency(dependent, target, self.edge_ttl)
            .await
        {
            warn!(dependent, target, error = %e, "failed to record cache dependency");
        }
        self.metrics
            .record_latency(CacheOperation::Link, start.elapsed());
    }

    /// Remove `key` and, transitively, every key depending on it.
    ///
    /// Returns the number of entries actually removed. Unknown keys are a
    /// no-op; duplicated or cyclic edges are visited once.
    pub async fn invalidate(&self, key: &str) -> u64 {
        let start = Instant::now();
        let mut queue = VecDeque::new();
        queue.push_back(key.to_string());
        let mut visited = HashSet::new();
        visited.insert(key.to_string());

        let mut count = 0u64;

        while let Some(current) = queue.pop_front() {
            match self.backend.get_dependents(&current).await {
                Ok(dependents) => {
                    if !dependents.is_empty() {
                        if let Err(e) = self.backend.remove_dependents(&current).await {
                            warn!(key = %current, error = %e, "failed to drop cache dependents");
                        }
                    }
                    for dependent in dependents {
                        if visited.insert(dependent.clone()) {
                            queue.push_back(dependent);
                        }
                    }
                }
                Err(e) => {
                    warn!(key = %current, error = %e, "failed to read cache dependents");
                }
            }

            match self.backend.delete(&current).await {
                Ok(true) => {
                    count += 1;
                    let reason = if current == key {
                        EvictionReason::Invalidated
                    } else {
                        EvictionReason::DependencyInvalidated
                    };
                    self.metrics.record_eviction(reason);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %current, error = %e, "failed to drop cache entry");
                }
            }
        }

        self.metrics
            .record_latency(CacheOperation::Invalidate, start.elapsed());
        count
    }
}

impl<B, M> Clone for DependencyGraph<B, M> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            metrics: self.metrics.clone(),
            edge_ttl: self.edge_ttl,
        }
    }
}
