use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use tenantry_core::{PartitionName, PartitionSettings};

use crate::connector::{DatabaseConnector, RetryPolicy};
use crate::document::{DocumentClient, DocumentFilter};
use crate::error::StoreError;

/// Process-wide owner of the database client.
///
/// The client is created on first use and shared by every request. All
/// callers that arrive while the first connect is in flight wait on the
/// same lock instead of opening their own connection.
pub struct ConnectionManager<C: DatabaseConnector> {
    connector: C,
    policy: RetryPolicy,
    partitions: PartitionSettings,
    client: RwLock<Option<Arc<C::Client>>>,
    connects: AtomicU32,
}

impl<C: DatabaseConnector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy, partitions: PartitionSettings) -> Self {
        Self {
            connector,
            policy,
            partitions,
            client: RwLock::new(None),
            connects: AtomicU32::new(0),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of successful connects made by this manager.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// The shared client, connecting first if needed.
    pub async fn client(&self) -> Result<Arc<C::Client>> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Arc::new(self.connect_with_retry().await?);
        *slot = Some(client.clone());
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }

    #[instrument(name = "store.connect", skip(self), fields(endpoint = %self.connector.endpoint()))]
    async fn connect_with_retry(&self) -> Result<C::Client> {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made");

        while attempts < self.policy.max_attempts {
            let remaining = self.policy.deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            attempts += 1;

            match tokio::time::timeout(remaining, self.connector.connect()).await {
                Ok(Ok(client)) => {
                    info!(attempts, "Connected to document store");
                    return Ok(client);
                }
                Ok(Err(e)) => {
                    warn!(attempt = attempts, error = %e, "Connect attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(attempt = attempts, "Connect attempt timed out");
                    last_error = format!("timed out after {remaining:?}");
                }
            }

            if attempts < self.policy.max_attempts {
                let remaining = self.policy.deadline.saturating_sub(started.elapsed());
                if remaining <= self.policy.backoff {
                    break;
                }
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        Err(StoreError::ConnectExhausted {
            endpoint: self.connector.endpoint(),
            attempts,
            elapsed: started.elapsed(),
            last_error,
        }
        .into())
    }

    /// Handle for a named partition on the shared client.
    pub async fn partition(
        &self,
        partition: &PartitionName,
    ) -> Result<PartitionHandle<C::Client>> {
        let client = self.client().await?;
        debug!(partition = %partition, "Partition handle issued");
        Ok(PartitionHandle {
            client,
            partition: partition.clone(),
        })
    }

    /// Handle for the tenant directory partition.
    pub async fn directory(&self) -> Result<PartitionHandle<C::Client>> {
        self.partition(&self.partitions.directory).await
    }

    /// Handle for the legacy single-tenant partition.
    pub async fn legacy(&self) -> Result<PartitionHandle<C::Client>> {
        self.partition(&self.partitions.legacy).await
    }

    pub fn partitions(&self) -> &PartitionSettings {
        &self.partitions
    }

    /// Round trip on the shared client, connecting first if needed.
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        let client = self.client().await?;
        tokio::time::timeout(timeout, client.ping())
            .await
            .map_err(|_| StoreError::Backend(format!("ping timed out after {timeout:?}")))?
    }

    /// Drop the shared client. The next caller reconnects.
    pub async fn shutdown(&self) {
        if self.client.write().await.take().is_some() {
            info!("Document store connection released");
        }
    }
}

/// A client bound to one partition.
///
/// The default parameter is the type-erased form handed to domain handlers.
pub struct PartitionHandle<Cl: DocumentClient + ?Sized = dyn DocumentClient> {
    client: Arc<Cl>,
    partition: PartitionName,
}

impl<Cl: DocumentClient + ?Sized> Clone for PartitionHandle<Cl> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            partition: self.partition.clone(),
        }
    }
}

impl<Cl: DocumentClient> PartitionHandle<Cl> {
    /// Hides the backend type.
    pub fn erased(self) -> PartitionHandle {
        PartitionHandle {
            client: self.client,
            partition: self.partition,
        }
    }
}

impl<Cl: DocumentClient + ?Sized> PartitionHandle<Cl> {
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    pub async fn find_one(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>> {
        self.client.find_one(&self.partition, collection, filter).await
    }

    pub async fn upsert_one(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        document: Value,
    ) -> Result<()> {
        self.client
            .upsert_one(&self.partition, collection, filter, document)
            .await
    }
}
