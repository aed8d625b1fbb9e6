use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use parking_lot::RwLock as SyncRwLock;
use redis::{AsyncCommands, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use eye_cache_core::{
    CacheBackend, CacheError, CacheOptions, CacheStats, DependencyBackend, Result, StoredEntry,
};

use super::config::RedisConfig;

const DEPS_SEGMENT: &str = "__deps__";

/// Where entries and dependency sets live in the Redis keyspace
#[derive(Debug, Clone)]
struct KeyLayout {
    prefix: Option<String>,
}

impl KeyLayout {
    fn entry(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// The set holding the dependents of `target`
    fn dependents(&self, target: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}:{}", prefix, DEPS_SEGMENT, target),
            None => format!("{}:{}", DEPS_SEGMENT, target),
        }
    }

    fn scan_pattern(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:*", prefix),
            None => "*".to_string(),
        }
    }

    fn is_dependents(&self, raw: &str) -> bool {
        raw.starts_with(&self.dependents(""))
    }
}

/// Redis backend implementation
///
/// Entries are JSON-encoded [`StoredEntry`] records written with `PSETEX`, so
/// Redis expires them on its own. Dependency edges are Redis sets keyed by
/// the depended-on key.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool<RedisConnectionManager>,
    layout: KeyLayout,
    stats: Arc<SyncRwLock<CacheStats>>,
}

impl RedisBackend {
    /// Create a new Redis backend
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            layout: KeyLayout {
                prefix: config.key_prefix,
            },
            stats: Arc::new(SyncRwLock::new(CacheStats::default())),
        })
    }

    /// Get connection from pool
    async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    /// Walk every key under the prefix
    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let pattern = self.layout.scan_pattern();
        let mut cursor = 0u64;
        let mut all = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut *conn)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;

            all.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(all)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry<Vec<u8>>>> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.layout.entry(key);

        let bytes: Option<Vec<u8>> = conn
            .get(&prefixed)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        let entry = match bytes {
            Some(data) => {
                let entry: StoredEntry<Vec<u8>> = serde_json::from_slice(&data)
                    .map_err(|e| CacheError::Deserialization(e.to_string()))?;
                // PSETEX has millisecond resolution; the record is authoritative.
                (!entry.is_expired()).then_some(entry)
            }
            None => None,
        };

        let mut stats = self.stats.write();
        if entry.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(entry)
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let size = value.len();
        let entry = StoredEntry {
            value,
            created_at: SystemTime::now(),
            ttl: options.ttl,
            size,
        };

        let serialized =
            serde_json::to_vec(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let prefixed = self.layout.entry(key);

        let mut pipe = redis::pipe();
        pipe.atomic();

        match options.ttl {
            Some(ttl) => {
                // PSETEX rejects 0; such an entry is already expired.
                let millis = (ttl.as_millis() as u64).max(1);
                pipe.pset_ex(&prefixed, &serialized, millis);
            }
            None => {
                pipe.set(&prefixed, &serialized);
            }
        }

        pipe.query_async::<Vec<Value>>(&mut *conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        self.stats.write().writes += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.layout.entry(key);

        let deleted: bool = conn
            .del(&prefixed)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        if deleted {
            self.stats.write().deletes += 1;
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.layout.entry(key);

        conn.exists(&prefixed)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.scan_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;
        for chunk in keys.chunks(1000) {
            let _: usize = conn
                .unlink(chunk)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.stats.read().clone())
    }

    async fn len(&self) -> Result<usize> {
        // O(N) scan; meant for debugging and metrics, not hot paths.
        let keys = self.scan_keys().await?;
        Ok(keys.iter().filter(|k| !self.layout.is_dependents(k)).count())
    }
}

#[async_trait]
impl DependencyBackend for RedisBackend {
    async fn add_dependency(
        &self,
        dependent: &str,
        target: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let set = self.layout.dependents(target);

        let mut pipe = redis::pipe();
        pipe.atomic().sadd(&set, dependent).ignore();
        match ttl {
            Some(ttl) => {
                pipe.pexpire(&set, (ttl.as_millis() as i64).max(1)).ignore();
            }
            None => {
                pipe.persist(&set).ignore();
            }
        }

        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn get_dependents(&self, target: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        conn.smembers(self.layout.dependents(target))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn remove_dependents(&self, target: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: usize = conn
            .del(self.layout.dependents(target))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }
}
