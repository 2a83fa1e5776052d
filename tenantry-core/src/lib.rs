//! tenantry-core: framework-agnostic core for Tenantry.
//!
//! Holds the tenant data model, the contracts of the two shared stores
//! (cache and authoritative directory), the structured error type and the
//! key/value configuration layer. Everything else in the workspace builds
//! on these types.

pub mod cache;
pub mod config;
pub mod email;
pub mod errors;
pub mod store;
pub mod tenant;

pub use cache::{CacheError, CacheKeys, CacheResult, CacheStore, DerivedScope};
pub use config::{
    ConnectSettings, PartitionSettings, TenantryConfig, TenantryConfigSnapshot, TenantrySettings,
};
pub use email::NormalizedEmail;
pub use errors::{ErrorKind, TenantryError};
pub use store::AuthoritativeStore;
pub use tenant::{
    AvailableTenantSet, EmploymentStatus, IntegrationProfile, PartitionName, TenantAssignment,
    TenantCacheValue, TenantContext, TenantId, TenantSummary, UserIdentityInTenant,
};
