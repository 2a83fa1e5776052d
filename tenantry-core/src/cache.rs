//! Shared cache contract and key naming.
//!
//! Key convention (every key is built from a [`NormalizedEmail`]):
//!
//! | key | owner | content |
//! |---|---|---|
//! | `tenant-context:{email}` | resolver / switch coordinator | JSON [`TenantCacheValue`](crate::TenantCacheValue) |
//! | `user:{email}:{scope}` | domain handlers | anything derived from the active tenant |
//!
//! Derived keys are invalidated on every tenant switch, so handlers must
//! only cache tenant-dependent data under a registered [`DerivedScope`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::email::NormalizedEmail;

pub type CacheResult<T> = Result<T, CacheError>;

/// Infrastructure errors for cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unreachable: {0}")]
    Unreachable(String),

    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache value could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Process-wide key/value store with per-key expiry.
///
/// Values are whole strings; a `set` replaces the previous value atomically.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Writes only when `key` holds no live value, as one atomic step.
    /// Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> CacheResult<bool>;

    async fn del(&self, key: &str) -> CacheResult<()>;
}

/// Name of one family of derived per-user cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedScope(String);

impl DerivedScope {
    pub const DASHBOARD: &'static str = "dashboard";
    pub const PUNCHES: &'static str = "punches";
    pub const NOTIFICATIONS: &'static str = "notifications";
    pub const DOCUMENTS: &'static str = "documents";
    pub const PAYROLL: &'static str = "payroll";

    /// Lowercased; `None` when blank or containing `:`.
    pub fn new(scope: &str) -> Option<Self> {
        let scope = scope.trim().to_lowercase();
        if scope.is_empty() || scope.contains(':') {
            return None;
        }
        Some(Self(scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn defaults() -> Vec<DerivedScope> {
        [
            Self::DASHBOARD,
            Self::PUNCHES,
            Self::NOTIFICATIONS,
            Self::DOCUMENTS,
            Self::PAYROLL,
        ]
        .iter()
        .filter_map(|s| Self::new(s))
        .collect()
    }
}

impl fmt::Display for DerivedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds every cache key Tenantry reads or invalidates.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    scopes: Vec<DerivedScope>,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new(DerivedScope::defaults())
    }
}

impl CacheKeys {
    pub fn new(scopes: Vec<DerivedScope>) -> Self {
        let mut unique: Vec<DerivedScope> = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if !unique.contains(&scope) {
                unique.push(scope);
            }
        }
        Self { scopes: unique }
    }

    pub fn scopes(&self) -> &[DerivedScope] {
        &self.scopes
    }

    pub fn context_key(&self, email: &NormalizedEmail) -> String {
        format!("tenant-context:{email}")
    }

    pub fn derived_key(&self, email: &NormalizedEmail, scope: &DerivedScope) -> String {
        format!("user:{email}:{scope}")
    }

    /// All derived keys for a user, in scope registration order.
    pub fn derived_keys(&self, email: &NormalizedEmail) -> Vec<String> {
        self.scopes
            .iter()
            .map(|scope| self.derived_key(email, scope))
            .collect()
    }
}
