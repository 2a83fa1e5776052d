//! Tenant switching.
//!
//! A switch runs Validate, Re-identify, Invalidate, Commit and Signal in
//! that order. Derived keys are gone before the new context is written, so
//! a reader that sees the new tenant can never see data cached for the old
//! one. The directory is updated afterwards by a background job; if that
//! fails the cache entry stays authoritative until its TTL runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use tenantry_core::{
    AuthoritativeStore, AvailableTenantSet, NormalizedEmail, PartitionName, TenantCacheValue,
    TenantContext, TenantId, TenantryError, UserIdentityInTenant,
};

use crate::background::{BackgroundJob, BackgroundQueue};
use crate::resolver::TenantResolver;
use crate::tenant_cache::TenantCache;

/// Why a switch did not happen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("No tenant assignment found for this user")]
    NoAssignmentData,

    #[error("User is not a member of tenant '{0}'")]
    NotAMember(TenantId),

    #[error("User has no identity in tenant '{0}'")]
    NoIdentityInTarget(TenantId),

    #[error("Tenant switch failed: {0}")]
    Storage(String),
}

impl SwitchError {
    /// Machine-readable reason reported to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoAssignmentData => "no-assignment-data",
            Self::NotAMember(_) => "not-a-member",
            Self::NoIdentityInTarget(_) => "no-identity-in-target",
            Self::Storage(_) => "internal-error",
        }
    }

    pub fn is_client_correctable(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<SwitchError> for TenantryError {
    fn from(err: SwitchError) -> Self {
        let reason = err.reason();
        let base = match err {
            SwitchError::Storage(_) => TenantryError::general_error("Tenant switch failed")
                .with_source(anyhow::Error::new(err)),
            other => TenantryError::not_found(other.to_string()),
        };
        base.with_reason(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchOutcome {
    Switched,
    AlreadyActive,
}

/// Result of a successful switch request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchReport {
    pub outcome: SwitchOutcome,
    pub tenant: TenantContext,
    /// Tells the caller to drop everything it cached client-side.
    pub discard_client_state: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

struct Membership {
    active: TenantContext,
    available: AvailableTenantSet,
}

#[derive(Clone)]
pub struct SwitchCoordinator {
    cache: TenantCache,
    store: Arc<dyn AuthoritativeStore>,
    resolver: TenantResolver,
    background: BackgroundQueue,
    store_timeout: Duration,
}

impl SwitchCoordinator {
    pub fn new(
        cache: TenantCache,
        store: Arc<dyn AuthoritativeStore>,
        resolver: TenantResolver,
        background: BackgroundQueue,
        store_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            resolver,
            background,
            store_timeout,
        }
    }

    #[instrument(name = "tenant.switch", skip(self), fields(email = %email, target = %requested))]
    pub async fn switch(
        &self,
        email: &NormalizedEmail,
        requested: &TenantId,
    ) -> Result<SwitchReport, SwitchError> {
        // Validate
        let membership = self.membership(email).await?;
        let Some(target) = membership.available.get(requested).cloned() else {
            info!("Switch rejected, not a member");
            return Err(SwitchError::NotAMember(requested.clone()));
        };
        if membership.active.tenant_id == *requested {
            info!("Tenant already active");
            return Ok(SwitchReport {
                outcome: SwitchOutcome::AlreadyActive,
                tenant: membership.active,
                discard_client_state: false,
                warnings: Vec::new(),
            });
        }

        // Re-identify
        let partition = self.resolver.partition_for(&target);
        let identity = self.identity_in(&partition, email, requested).await?;

        // Invalidate
        let removed = self
            .cache
            .invalidate_derived(email)
            .await
            .map_err(|e| SwitchError::Storage(format!("invalidating derived keys: {e}")))?;

        // Commit
        let switched_at = Utc::now();
        let active =
            TenantContext::from_summary(&target, partition.clone()).switched_at(switched_at);
        let value = TenantCacheValue::new(active.clone(), membership.available, identity)
            .map_err(|e| SwitchError::Storage(e.message))?;
        self.cache
            .put(email, &value)
            .await
            .map_err(|e| SwitchError::Storage(format!("writing tenant context: {e}")))?;

        let mut warnings = Vec::new();
        if let Err(e) = self.background.enqueue(BackgroundJob::RecordSwitch {
            email: email.clone(),
            tenant_id: requested.clone(),
            switched_at,
        }) {
            warnings.push(e.to_string());
        }

        info!(partition = %partition, derived_keys = removed, "Tenant switched");

        // Signal
        Ok(SwitchReport {
            outcome: SwitchOutcome::Switched,
            tenant: active,
            discard_client_state: true,
            warnings,
        })
    }

    /// Active tenant and available set, from the cache or else the directory.
    async fn membership(&self, email: &NormalizedEmail) -> Result<Membership, SwitchError> {
        if let Some(value) = self.cache.get(email).await {
            return Ok(Membership {
                active: value.active,
                available: value.available,
            });
        }

        let lookup = self.store.lookup_assignment(email);
        let assignment = match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(Some(assignment))) => assignment,
            Ok(Ok(None)) => return Err(SwitchError::NoAssignmentData),
            Ok(Err(e)) => {
                warn!(error = %e, "Directory unavailable during switch");
                return Err(SwitchError::Storage(e.to_string()));
            }
            Err(_) => {
                return Err(SwitchError::Storage(format!(
                    "directory timed out after {:?}",
                    self.store_timeout
                )))
            }
        };
        if assignment.available.is_empty() {
            return Err(SwitchError::NoAssignmentData);
        }

        let partition = self.resolver.partition_for(&assignment.active);
        Ok(Membership {
            active: TenantContext::from_summary(&assignment.active, partition),
            available: assignment.available,
        })
    }

    async fn identity_in(
        &self,
        partition: &PartitionName,
        email: &NormalizedEmail,
        requested: &TenantId,
    ) -> Result<UserIdentityInTenant, SwitchError> {
        let lookup = self.store.lookup_identity(partition, email);
        match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(Some(identity))) => Ok(identity),
            Ok(Ok(None)) => {
                info!(partition = %partition, "Switch rejected, no identity in target");
                Err(SwitchError::NoIdentityInTarget(requested.clone()))
            }
            Ok(Err(e)) => Err(SwitchError::Storage(e.to_string())),
            Err(_) => Err(SwitchError::Storage(format!(
                "identity lookup timed out after {:?}",
                self.store_timeout
            ))),
        }
    }
}

