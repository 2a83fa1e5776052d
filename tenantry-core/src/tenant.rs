//! Core multi-tenant types for Tenantry.
//!
//! A login belongs to one or more tenants. Each tenant owns exactly one
//! physical partition, and every request must run against the partition of
//! the user's currently active tenant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::TenantryError;

/// Public tenant identifier (slug, host name or url).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Name of the physical database/schema a request must use.
///
/// Never empty: construction and deserialization both reject blank names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionName(pub(crate) String);

impl PartitionName {
    /// Returns `None` for blank input.
    pub fn new<S: Into<String>>(name: S) -> Option<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Like [`PartitionName::new`], but reports blank input as a `BadRequest`.
    pub fn parse<S: Into<String>>(name: S) -> Result<Self, TenantryError> {
        Self::new(name)
            .ok_or_else(|| TenantryError::bad_request("partition name must not be empty"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PartitionName {
    type Error = TenantryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PartitionName> for String {
    fn from(value: PartitionName) -> Self {
        value.0
    }
}

/// How a tenant talks to downstream payroll / HR systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationProfile {
    #[default]
    Standard,
    PayrollExport,
    TimeclockSync,
    ExternalHris,
}

/// Employment status of a user inside one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentStatus {
    Active,
    OnLeave,
    Pending,
    Terminated,
    #[default]
    #[serde(other)]
    Unknown,
}

fn blank_partition_as_none<'de, D>(deserializer: D) -> Result<Option<PartitionName>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(PartitionName::new))
}

/// One entry of a user's [`AvailableTenantSet`].
///
/// The directory may not know the partition of older tenants; those get a
/// derived partition at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    #[serde(
        default,
        deserialize_with = "blank_partition_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub partition_name: Option<PartitionName>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub integration_profile: IntegrationProfile,
}

impl TenantSummary {
    pub fn new<S: Into<String>>(tenant_id: S) -> Self {
        let tenant_id = TenantId(tenant_id.into());
        Self {
            display_name: tenant_id.0.clone(),
            tenant_id,
            partition_name: None,
            integration_profile: IntegrationProfile::default(),
        }
    }

    pub fn with_partition(mut self, partition: PartitionName) -> Self {
        self.partition_name = Some(partition);
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_profile(mut self, profile: IntegrationProfile) -> Self {
        self.integration_profile = profile;
        self
    }
}

/// Ordered set of tenants a login may activate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailableTenantSet(Vec<TenantSummary>);

impl AvailableTenantSet {
    /// Keeps first occurrence order and drops duplicate tenant ids.
    pub fn new(tenants: Vec<TenantSummary>) -> Self {
        let mut out: Vec<TenantSummary> = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            if !out.iter().any(|t| t.tenant_id == tenant.tenant_id) {
                out.push(tenant);
            }
        }
        Self(out)
    }

    pub fn contains(&self, tenant_id: &TenantId) -> bool {
        self.get(tenant_id).is_some()
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<&TenantSummary> {
        self.0.iter().find(|t| &t.tenant_id == tenant_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TenantSummary> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TenantSummary> for AvailableTenantSet {
    fn from_iter<T: IntoIterator<Item = TenantSummary>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The tenant a user is currently working in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub partition_name: PartitionName,
    pub display_name: String,
    #[serde(default)]
    pub integration_profile: IntegrationProfile,
    #[serde(default)]
    pub last_switched_at: Option<DateTime<Utc>>,
}

impl TenantContext {
    /// Build a context from a directory summary and the partition chosen for it.
    pub fn from_summary(summary: &TenantSummary, partition_name: PartitionName) -> Self {
        Self {
            tenant_id: summary.tenant_id.clone(),
            partition_name,
            display_name: summary.display_name.clone(),
            integration_profile: summary.integration_profile,
            last_switched_at: None,
        }
    }

    pub fn switched_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_switched_at = Some(at);
        self
    }

    pub fn summary(&self) -> TenantSummary {
        TenantSummary {
            tenant_id: self.tenant_id.clone(),
            partition_name: Some(self.partition_name.clone()),
            display_name: self.display_name.clone(),
            integration_profile: self.integration_profile,
        }
    }
}

/// Per-partition projection of a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentityInTenant {
    pub user_id: String,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: EmploymentStatus,
}

/// What the directory knows about a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAssignment {
    pub active: TenantSummary,
    pub available: AvailableTenantSet,
}

/// Value stored under a user's context cache key.
///
/// Always written and read as one whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCacheValue {
    pub active: TenantContext,
    pub available: AvailableTenantSet,
    pub identity: UserIdentityInTenant,
}

impl TenantCacheValue {
    /// Rejects values whose active tenant is not part of the available set.
    pub fn new(
        active: TenantContext,
        available: AvailableTenantSet,
        identity: UserIdentityInTenant,
    ) -> Result<Self, TenantryError> {
        let value = Self {
            active,
            available,
            identity,
        };
        if !value.is_consistent() {
            return Err(TenantryError::conflict(format!(
                "active tenant '{}' is not in the available set",
                value.active.tenant_id
            )));
        }
        Ok(value)
    }

    pub fn is_consistent(&self) -> bool {
        self.available.contains(&self.active.tenant_id)
    }
}
