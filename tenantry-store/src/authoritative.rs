//! Tenant directory backed by the partitioned document store.
//!
//! Layout:
//! - directory partition, `user_tenants`: one document per login with the
//!   tenants it may enter and the one it last switched to.
//! - tenant partition, `users`: the login's identity inside that tenant.
//! - directory partition, `tenant_switches`: append-only switch history.
//!
//! Documents are matched on exact `email` equality against the
//! [`NormalizedEmail`], so stores must hold emails trimmed and lowercased.
//! Every document written here carries the normalized form.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use tenantry_core::{
    AuthoritativeStore, AvailableTenantSet, NormalizedEmail, PartitionName, TenantAssignment,
    TenantId, TenantSummary, UserIdentityInTenant,
};

use crate::connector::DatabaseConnector;
use crate::document::DocumentFilter;
use crate::error::StoreError;
use crate::manager::ConnectionManager;

pub const DIRECTORY_COLLECTION: &str = "user_tenants";
pub const IDENTITY_COLLECTION: &str = "users";
pub const SWITCH_LOG_COLLECTION: &str = "tenant_switches";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectoryRecord {
    email: String,
    #[serde(default)]
    active_tenant: Option<TenantId>,
    #[serde(default)]
    last_switched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tenants: Vec<TenantSummary>,
}

impl DirectoryRecord {
    fn into_assignment(self) -> Option<TenantAssignment> {
        let available = AvailableTenantSet::new(self.tenants);
        let active = match &self.active_tenant {
            Some(id) => available.get(id).cloned(),
            None => None,
        }
        .or_else(|| available.iter().next().cloned())?;

        Some(TenantAssignment { active, available })
    }
}

pub struct DocumentAuthoritativeStore<C: DatabaseConnector> {
    connections: Arc<ConnectionManager<C>>,
}

impl<C: DatabaseConnector> Clone for DocumentAuthoritativeStore<C> {
    fn clone(&self) -> Self {
        Self {
            connections: self.connections.clone(),
        }
    }
}

impl<C: DatabaseConnector> DocumentAuthoritativeStore<C> {
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager<C>> {
        &self.connections
    }

    async fn directory_record(&self, email: &NormalizedEmail) -> Result<Option<DirectoryRecord>> {
        let directory = self.connections.directory().await?;
        let Some(doc) = directory
            .find_one(DIRECTORY_COLLECTION, &DocumentFilter::by("email", email.as_str()))
            .await?
        else {
            return Ok(None);
        };

        let record = serde_json::from_value(doc).map_err(|e| StoreError::MalformedDocument {
            collection: DIRECTORY_COLLECTION.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(record))
    }
}

#[async_trait]
impl<C: DatabaseConnector> AuthoritativeStore for DocumentAuthoritativeStore<C> {
    #[instrument(name = "directory.lookup_assignment", skip(self), fields(email = %email))]
    async fn lookup_assignment(&self, email: &NormalizedEmail) -> Result<Option<TenantAssignment>> {
        let assignment = self
            .directory_record(email)
            .await?
            .and_then(DirectoryRecord::into_assignment);
        debug!(found = assignment.is_some(), "Directory lookup finished");
        Ok(assignment)
    }

    #[instrument(
        name = "directory.lookup_identity",
        skip(self),
        fields(email = %email, partition = %partition)
    )]
    async fn lookup_identity(
        &self,
        partition: &PartitionName,
        email: &NormalizedEmail,
    ) -> Result<Option<UserIdentityInTenant>> {
        let handle = self.connections.partition(partition).await?;
        let Some(doc) = handle
            .find_one(IDENTITY_COLLECTION, &DocumentFilter::by("email", email.as_str()))
            .await?
        else {
            return Ok(None);
        };

        let identity = serde_json::from_value(doc).map_err(|e| StoreError::MalformedDocument {
            collection: IDENTITY_COLLECTION.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(identity))
    }

    #[instrument(
        name = "directory.record_switch",
        skip(self),
        fields(email = %email, tenant = %tenant_id)
    )]
    async fn record_switch(
        &self,
        email: &NormalizedEmail,
        tenant_id: &TenantId,
        switched_at: DateTime<Utc>,
    ) -> Result<()> {
        let directory = self.connections.directory().await?;

        let entry = json!({
            "email": email.as_str(),
            "tenant_id": tenant_id.as_str(),
            "switched_at": switched_at.to_rfc3339(),
        });
        let entry_filter = DocumentFilter::by("email", email.as_str())
            .and("switched_at", switched_at.to_rfc3339());
        directory
            .upsert_one(SWITCH_LOG_COLLECTION, &entry_filter, entry)
            .await
            .context("appending switch history")?;

        if let Some(mut record) = self.directory_record(email).await? {
            record.email = email.as_str().to_string();
            record.active_tenant = Some(tenant_id.clone());
            record.last_switched_at = Some(switched_at);
            let doc: Value = serde_json::to_value(&record)?;
            directory
                .upsert_one(
                    DIRECTORY_COLLECTION,
                    &DocumentFilter::by("email", email.as_str()),
                    doc,
                )
                .await
                .context("updating active tenant")?;
        }
        Ok(())
    }
}
