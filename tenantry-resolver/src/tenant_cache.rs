use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tenantry_core::{
    CacheError, CacheKeys, CacheResult, CacheStore, NormalizedEmail, TenantCacheValue,
};

/// Typed, timeout-guarded access to the tenant context entries.
///
/// Writes always replace the whole value in one `set`.
#[derive(Clone)]
pub struct TenantCache {
    store: Arc<dyn CacheStore>,
    keys: CacheKeys,
    ttl: Duration,
    timeout: Duration,
}

impl TenantCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        keys: CacheKeys,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            ttl,
            timeout,
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn guarded<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .unwrap_or(Err(CacheError::Timeout(self.timeout)))
    }

    /// Reads the context entry, reporting infrastructure failures.
    ///
    /// Undecodable or inconsistent values read as absent.
    pub async fn try_get(&self, email: &NormalizedEmail) -> CacheResult<Option<TenantCacheValue>> {
        let key = self.keys.context_key(email);
        let Some(raw) = self.guarded(self.store.get(&key)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<TenantCacheValue>(&raw) {
            Ok(value) if value.is_consistent() => Ok(Some(value)),
            Ok(_) => {
                warn!(key = %key, "Cached tenant context is inconsistent, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cached tenant context is unreadable, ignoring");
                Ok(None)
            }
        }
    }

    /// Read path: any failure is a miss.
    pub async fn get(&self, email: &NormalizedEmail) -> Option<TenantCacheValue> {
        match self.try_get(email).await {
            Ok(value) => value,
            Err(e) => {
                debug!(email = %email, error = %e, "Tenant cache read degraded to miss");
                None
            }
        }
    }

    pub async fn put(&self, email: &NormalizedEmail, value: &TenantCacheValue) -> CacheResult<()> {
        let key = self.keys.context_key(email);
        let raw = serde_json::to_string(value)?;
        self.guarded(self.store.set(&key, raw, self.ttl)).await
    }

    /// Writes `value` only if no entry exists. Returns whether it was written.
    pub async fn put_if_absent(
        &self,
        email: &NormalizedEmail,
        value: &TenantCacheValue,
    ) -> CacheResult<bool> {
        let key = self.keys.context_key(email);
        let raw = serde_json::to_string(value)?;
        self.guarded(self.store.set_if_absent(&key, raw, self.ttl)).await
    }

    /// Deletes every derived key of the user, stopping at the first failure.
    pub async fn invalidate_derived(&self, email: &NormalizedEmail) -> CacheResult<usize> {
        let keys = self.keys.derived_keys(email);
        for key in &keys {
            self.guarded(self.store.del(key)).await?;
        }
        Ok(keys.len())
    }

    pub async fn remove(&self, email: &NormalizedEmail) -> CacheResult<()> {
        let key = self.keys.context_key(email);
        self.guarded(self.store.del(&key)).await
    }
}
