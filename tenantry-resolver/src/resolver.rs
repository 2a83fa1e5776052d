use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use tenantry_core::{
    AuthoritativeStore, NormalizedEmail, PartitionName, PartitionSettings, TenantAssignment,
    TenantContext, TenantSummary,
};

use crate::background::{BackgroundJob, BackgroundQueue};
use crate::heuristic::{self, Derivation};
use crate::tenant_cache::TenantCache;

/// Which tier produced a partition name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", content = "partition", rename_all = "kebab-case")]
pub enum Resolution {
    FromRequest(PartitionName),
    FromCache(PartitionName),
    FromStore(PartitionName),
    Heuristic(PartitionName),
    Default(PartitionName),
}

impl Resolution {
    pub fn partition(&self) -> &PartitionName {
        match self {
            Self::FromRequest(p)
            | Self::FromCache(p)
            | Self::FromStore(p)
            | Self::Heuristic(p)
            | Self::Default(p) => p,
        }
    }

    pub fn into_partition(self) -> PartitionName {
        match self {
            Self::FromRequest(p)
            | Self::FromCache(p)
            | Self::FromStore(p)
            | Self::Heuristic(p)
            | Self::Default(p) => p,
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            Self::FromRequest(_) => "from-request",
            Self::FromCache(_) => "from-cache",
            Self::FromStore(_) => "from-store",
            Self::Heuristic(_) => "heuristic",
            Self::Default(_) => "default",
        }
    }
}

impl From<Derivation> for Resolution {
    fn from(derivation: Derivation) -> Self {
        match derivation {
            Derivation::Prefix(p) | Derivation::Legacy(p) => Self::Heuristic(p),
            Derivation::Default(p) => Self::Default(p),
        }
    }
}

/// Answers "which partition does this request use".
///
/// Resolution never fails: unreachable stores degrade to the heuristic or
/// the default partition.
#[derive(Clone)]
pub struct TenantResolver {
    cache: TenantCache,
    store: Arc<dyn AuthoritativeStore>,
    background: BackgroundQueue,
    partitions: PartitionSettings,
    store_timeout: Duration,
}

impl TenantResolver {
    pub fn new(
        cache: TenantCache,
        store: Arc<dyn AuthoritativeStore>,
        background: BackgroundQueue,
        partitions: PartitionSettings,
        store_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            background,
            partitions,
            store_timeout,
        }
    }

    #[instrument(name = "tenant.resolve", skip(self, attached), fields(email = %email, tier))]
    pub async fn resolve(
        &self,
        email: &NormalizedEmail,
        attached: Option<&TenantContext>,
    ) -> Resolution {
        let resolution = self.resolve_tiers(email, attached).await;
        tracing::Span::current().record("tier", resolution.tier());
        debug!(partition = %resolution.partition(), "Partition resolved");
        resolution
    }

    pub async fn resolve_partition(
        &self,
        email: &NormalizedEmail,
        attached: Option<&TenantContext>,
    ) -> PartitionName {
        self.resolve(email, attached).await.into_partition()
    }

    async fn resolve_tiers(
        &self,
        email: &NormalizedEmail,
        attached: Option<&TenantContext>,
    ) -> Resolution {
        if let Some(ctx) = attached {
            return Resolution::FromRequest(ctx.partition_name.clone());
        }

        if let Some(value) = self.cache.get(email).await {
            return Resolution::FromCache(value.active.partition_name);
        }

        let Some(assignment) = self.lookup_assignment(email).await else {
            return heuristic::derive(None, &self.partitions).into();
        };

        match assignment.active.partition_name.clone() {
            Some(partition) => {
                // Queue failures are logged by the queue; resolution goes on.
                let _ = self.background.enqueue(BackgroundJob::RepopulateCache {
                    email: email.clone(),
                    assignment,
                    partition: partition.clone(),
                });
                Resolution::FromStore(partition)
            }
            None => heuristic::derive(Some(&assignment.active.tenant_id), &self.partitions).into(),
        }
    }

    /// Directory lookup with the store timeout; failures read as absent.
    pub async fn lookup_assignment(&self, email: &NormalizedEmail) -> Option<TenantAssignment> {
        match tokio::time::timeout(self.store_timeout, self.store.lookup_assignment(email)).await {
            Ok(Ok(assignment)) => assignment,
            Ok(Err(e)) => {
                warn!(email = %email, error = %e, "Tenant directory lookup failed");
                None
            }
            Err(_) => {
                warn!(
                    email = %email,
                    timeout = ?self.store_timeout,
                    "Tenant directory lookup timed out"
                );
                None
            }
        }
    }

    /// Partition of a directory entry, derived when the directory has none.
    pub fn partition_for(&self, summary: &TenantSummary) -> PartitionName {
        summary.partition_name.clone().unwrap_or_else(|| {
            heuristic::derive(Some(&summary.tenant_id), &self.partitions).into_partition()
        })
    }
}
