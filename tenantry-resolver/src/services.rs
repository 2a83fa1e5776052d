use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use tenantry_core::{
    AuthoritativeStore, AvailableTenantSet, CacheKeys, CacheResult, CacheStore, NormalizedEmail,
    PartitionName, TenantContext, TenantId, TenantrySettings,
};

use crate::background::{BackgroundEvent, BackgroundQueue};
use crate::resolver::{Resolution, TenantResolver};
use crate::switch::{SwitchCoordinator, SwitchError, SwitchReport};
use crate::tenant_cache::TenantCache;

/// Where a [`TenantView`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewSource {
    Cache,
    Store,
}

/// Active tenant plus the picker list for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub active: TenantContext,
    pub available: AvailableTenantSet,
    pub source: ViewSource,
}

/// Everything a request handler needs, wired from one set of settings.
#[derive(Clone)]
pub struct TenantServices {
    cache: TenantCache,
    resolver: TenantResolver,
    coordinator: SwitchCoordinator,
    background: BackgroundQueue,
}

impl TenantServices {
    /// Wires the services and spawns the background worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        settings: &TenantrySettings,
        cache_store: Arc<dyn CacheStore>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> (Self, JoinHandle<()>) {
        let cache = TenantCache::new(
            cache_store,
            CacheKeys::new(settings.derived_scopes.clone()),
            settings.cache_ttl,
            settings.cache_timeout,
        );
        let (background, worker) = BackgroundQueue::start(
            settings.background_capacity,
            cache.clone(),
            store.clone(),
            settings.store_timeout,
        );
        let resolver = TenantResolver::new(
            cache.clone(),
            store.clone(),
            background.clone(),
            settings.partitions.clone(),
            settings.store_timeout,
        );
        let coordinator = SwitchCoordinator::new(
            cache.clone(),
            store,
            resolver.clone(),
            background.clone(),
            settings.store_timeout,
        );

        (
            Self {
                cache,
                resolver,
                coordinator,
                background,
            },
            worker,
        )
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn coordinator(&self) -> &SwitchCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &TenantCache {
        &self.cache
    }

    pub fn events(&self) -> broadcast::Receiver<BackgroundEvent> {
        self.background.subscribe()
    }

    pub async fn resolve(
        &self,
        email: &NormalizedEmail,
        attached: Option<&TenantContext>,
    ) -> Resolution {
        self.resolver.resolve(email, attached).await
    }

    pub async fn resolve_partition(
        &self,
        email: &NormalizedEmail,
        attached: Option<&TenantContext>,
    ) -> PartitionName {
        self.resolver.resolve_partition(email, attached).await
    }

    pub async fn switch(
        &self,
        email: &NormalizedEmail,
        tenant_id: &TenantId,
    ) -> Result<SwitchReport, SwitchError> {
        self.coordinator.switch(email, tenant_id).await
    }

    /// Read-only view for the tenant picker. `None` when nothing is known.
    pub async fn current(&self, email: &NormalizedEmail) -> Option<TenantView> {
        if let Some(value) = self.cache.get(email).await {
            return Some(TenantView {
                active: value.active,
                available: value.available,
                source: ViewSource::Cache,
            });
        }

        let assignment = self.resolver.lookup_assignment(email).await?;
        let partition = self.resolver.partition_for(&assignment.active);
        Some(TenantView {
            active: TenantContext::from_summary(&assignment.active, partition),
            available: assignment.available,
            source: ViewSource::Store,
        })
    }

    /// Drops the user's context entry and every derived key.
    pub async fn invalidate_user(&self, email: &NormalizedEmail) -> CacheResult<()> {
        let derived = self.cache.invalidate_derived(email).await?;
        self.cache.remove(email).await?;
        info!(email = %email, derived_keys = derived, "Tenant cache invalidated");
        Ok(())
    }
}
