use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info};

use tenantry_core::{CacheError, CacheResult, CacheStore};

/// A write observed by a [`MemoryCache`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
    Set { key: String, ttl: Duration },
    Del { key: String },
}

impl CacheWrite {
    pub fn key(&self) -> &str {
        match self {
            CacheWrite::Set { key, .. } | CacheWrite::Del { key } => key,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    latency: Option<Duration>,
}

/// In-memory cache for testing and development.
///
/// Cloning shares the underlying map, like connections to one server.
/// Expiry uses tokio's clock, so tests can drive it with `tokio::time::pause`.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
    faults: Arc<RwLock<Faults>>,
    writes: Arc<Mutex<Vec<CacheWrite>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unreachable` until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.write().unreachable = unreachable;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.write().latency = latency;
    }

    /// Every successful `set`/`del` since creation (or the last clear).
    pub fn write_log(&self) -> Vec<CacheWrite> {
        self.writes.lock().clone()
    }

    pub fn clear_write_log(&self) {
        self.writes.lock().clear();
    }

    /// Live value of `key`, bypassing faults and the write log (test helper).
    pub fn peek(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.value.clone())
    }

    /// Number of stored keys, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        before - entries.len()
    }

    async fn before_call(&self) -> CacheResult<()> {
        let (unreachable, latency) = {
            let faults = self.faults.read();
            (faults.unreachable, faults.latency)
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        if unreachable {
            return Err(CacheError::Unreachable("memory cache marked unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.before_call().await?;

        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(stored) if stored.expires_at > now => return Ok(Some(stored.value.clone())),
                Some(_) => {}
            }
        }

        // Lazily evict; re-check under the write lock in case a writer refreshed it.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|stored| stored.expires_at <= now) {
            entries.remove(key);
            debug!(key, "evicted expired cache key");
        }
        Ok(entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.before_call().await?;

        let stored = StoredValue {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), stored);
        self.writes.lock().push(CacheWrite::Set {
            key: key.to_string(),
            ttl,
        });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> CacheResult<bool> {
        self.before_call().await?;

        let now = Instant::now();
        {
            let mut entries = self.entries.write();
            if entries.get(key).is_some_and(|stored| stored.expires_at > now) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                StoredValue {
                    value,
                    expires_at: now + ttl,
                },
            );
        }
        self.writes.lock().push(CacheWrite::Set {
            key: key.to_string(),
            ttl,
        });
        Ok(true)
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.before_call().await?;

        self.entries.write().remove(key);
        self.writes.lock().push(CacheWrite::Del {
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Periodically purges expired keys from a [`MemoryCache`].
pub struct MemoryCachePurger {
    cache: MemoryCache,
    interval: Duration,
}

impl MemoryCachePurger {
    pub fn new(cache: MemoryCache) -> Self {
        Self {
            cache,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(cache: MemoryCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Start the purge loop on the current runtime.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            info!("Starting memory cache purger with interval: {:?}", self.interval);
            loop {
                ticker.tick().await;
                let purged = self.cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "purged expired cache keys");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purger_removes_expired_keys() {
        let cache = MemoryCache::new();
        cache.set("short", "1".to_string(), Duration::from_secs(1)).await.unwrap();
        cache.set("long", "2".to_string(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek("long"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn outage_fails_every_call_and_records_nothing() {
        let cache = MemoryCache::new();
        cache.set_unreachable(true);

        assert!(matches!(cache.get("k").await, Err(CacheError::Unreachable(_))));
        assert!(cache.set("k", "v".to_string(), Duration::from_secs(1)).await.is_err());
        assert!(cache.del("k").await.is_err());
        assert!(cache.write_log().is_empty());

        cache.set_unreachable(false);
        cache.del("k").await.unwrap();
        assert_eq!(cache.write_log(), vec![CacheWrite::Del { key: "k".to_string() }]);
    }
}
