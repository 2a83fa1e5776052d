//! Builds a [`TenantryApp`] from flat configuration.
//!
//! | key | values | default |
//! |-----|--------|---------|
//! | `cache.backend` | `memory`, `redis` | `memory` |
//! | `redis.url` | connection URL | `redis://127.0.0.1:6379` |
//! | `store.backend` | `memory`, `typedb` | `memory` |
//!
//! The remaining keys are read by [`TenantrySettings::from_snapshot`] and,
//! for TypeDB, `TypeDBConnector::from_config`.

use std::sync::Arc;

use tracing::info;

use tenantry_cache::{MemoryCache, MemoryCachePurger};
use tenantry_core::{
    CacheStore, TenantryConfig, TenantryConfigSnapshot, TenantryError, TenantrySettings,
};
use tenantry_resolver::TenantServices;
use tenantry_store::{
    ConnectionManager, DatabaseConnector, DocumentAuthoritativeStore, MemoryConnector, RetryPolicy,
};

use crate::{TenantryApp, TenantryAxumState};

pub fn build(config: &TenantryConfig) -> anyhow::Result<TenantryApp> {
    let cfg = config.snapshot();
    let settings = TenantrySettings::from_snapshot(&cfg)?;
    let cache = cache_store(&cfg)?;

    let backend = cfg.get_string("store.backend").unwrap_or_else(|| "memory".to_string());
    info!(backend = %backend, "Using document store backend");
    match backend.as_str() {
        "memory" => Ok(wire(&settings, cache, MemoryConnector::default())),
        #[cfg(feature = "typedb")]
        "typedb" => {
            let connector = tenantry_store::TypeDBConnector::from_config(&cfg);
            Ok(wire(&settings, cache, connector))
        }
        other => Err(unsupported("store", other)),
    }
}

fn cache_store(cfg: &TenantryConfigSnapshot) -> anyhow::Result<Arc<dyn CacheStore>> {
    let backend = cfg.get_string("cache.backend").unwrap_or_else(|| "memory".to_string());
    info!(backend = %backend, "Using cache backend");
    match backend.as_str() {
        "memory" => {
            let cache = MemoryCache::new();
            MemoryCachePurger::new(cache.clone()).start();
            Ok(Arc::new(cache))
        }
        #[cfg(feature = "redis")]
        "redis" => {
            let url = cfg
                .get_string("redis.url")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
            Ok(Arc::new(tenantry_cache::RedisCache::open(&url)?))
        }
        other => Err(unsupported("cache", other)),
    }
}

fn unsupported(kind: &str, backend: &str) -> anyhow::Error {
    TenantryError::bad_request(format!("Unsupported {kind} backend '{backend}'")).into_anyhow()
}

/// Connects the tenant services to a document store reached through `connector`.
pub fn wire<C: DatabaseConnector>(
    settings: &TenantrySettings,
    cache: Arc<dyn CacheStore>,
    connector: C,
) -> TenantryApp {
    let connections = Arc::new(ConnectionManager::new(
        connector,
        RetryPolicy::from(&settings.connect),
        settings.partitions.clone(),
    ));
    let store = Arc::new(DocumentAuthoritativeStore::new(connections.clone()));
    let (services, _worker) = TenantServices::new(settings, cache, store);

    TenantryApp::new(TenantryAxumState::new(services, connections)).with_tenant_routes()
}
