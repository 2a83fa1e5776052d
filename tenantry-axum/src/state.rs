use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use tenantry_core::PartitionName;
use tenantry_resolver::TenantServices;
use tenantry_store::{ConnectionManager, DatabaseConnector, PartitionHandle};

/// The document store as seen by request handlers.
#[async_trait]
pub trait PartitionConnections: Send + Sync {
    /// Handle scoped to `partition` on the shared client.
    async fn connection(&self, partition: &PartitionName) -> Result<PartitionHandle>;

    /// Round trip used by `/health`.
    async fn check(&self) -> Result<()>;
}

#[async_trait]
impl<C: DatabaseConnector> PartitionConnections for ConnectionManager<C> {
    async fn connection(&self, partition: &PartitionName) -> Result<PartitionHandle> {
        Ok(self.partition(partition).await?.erased())
    }

    async fn check(&self) -> Result<()> {
        self.ping(self.policy().deadline).await
    }
}

#[derive(Clone)]
pub struct TenantryAxumState {
    pub services: TenantServices,
    pub connections: Arc<dyn PartitionConnections>,
}

impl TenantryAxumState {
    pub fn new(services: TenantServices, connections: Arc<dyn PartitionConnections>) -> Self {
        Self {
            services,
            connections,
        }
    }

    pub async fn connection(&self, partition: &PartitionName) -> Result<PartitionHandle> {
        self.connections.connection(partition).await
    }
}
