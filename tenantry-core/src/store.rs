use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::email::NormalizedEmail;
use crate::tenant::{PartitionName, TenantAssignment, TenantId, UserIdentityInTenant};

/// Durable directory of tenant assignments.
///
/// The only source able to resolve a login that has never been cached.
/// `Ok(None)` means "the directory has no record"; `Err` means the directory
/// could not be asked.
#[async_trait]
pub trait AuthoritativeStore: Send + Sync {
    async fn lookup_assignment(&self, email: &NormalizedEmail) -> Result<Option<TenantAssignment>>;

    /// Looks the login up inside one tenant's own partition.
    async fn lookup_identity(
        &self,
        partition: &PartitionName,
        email: &NormalizedEmail,
    ) -> Result<Option<UserIdentityInTenant>>;

    /// Persist that `email` switched to `tenant_id` at `switched_at`.
    async fn record_switch(
        &self,
        email: &NormalizedEmail,
        tenant_id: &TenantId,
        switched_at: DateTime<Utc>,
    ) -> Result<()>;
}
