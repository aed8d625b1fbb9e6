use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;

type Shared = Arc<dyn Any + Send + Sync>;

/// Single-flight for cache misses.
///
/// The first caller for a key runs its fetch; callers arriving while it is in
/// flight wait for that result instead of issuing their own. If the leader
/// goes away without a result, a waiting caller runs its own fetch.
#[derive(Clone, Default)]
pub struct Coalescer {
    inflight: Arc<DashMap<String, broadcast::Sender<Shared>>>,
}

/// Clears the in-flight slot even when the leader future is dropped
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, broadcast::Sender<Shared>>,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.key);
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a fetch in flight
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub async fn run<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // The entry lock is released at the end of this block
        let role = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(leader) => Ok(leader.get().subscribe()),
            Entry::Vacant(slot) => {
                let (tx, _rx) = broadcast::channel(1);
                slot.insert(tx.clone());
                Err(tx)
            }
        };

        match role {
            Ok(mut rx) => {
                if let Ok(shared) = rx.recv().await {
                    if let Some(result) = shared.downcast_ref::<Result<T>>() {
                        return result.clone();
                    }
                }
                fetch().await
            }
            Err(tx) => {
                let guard = InflightGuard {
                    inflight: &self.inflight,
                    key,
                };
                let result = fetch().await;
                drop(guard);

                if tx.receiver_count() > 0 {
                    let shared: Shared = Arc::new(result.clone());
                    let _ = tx.send(shared);
                }
                result
            }
        }
    }
}
