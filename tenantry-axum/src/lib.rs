//! tenantry-axum: HTTP surface for Tenantry.
//!
//! Exposes tenant switching and inspection endpoints, a middleware that
//! attaches the caller's resolved partition to every request, and the
//! bootstrap used by the `tenantry-server` binary.

pub mod app;
pub mod bootstrap;
pub mod identity;
pub mod middleware;
pub mod routes;
pub mod state;
mod error;

pub use app::TenantryApp;
pub use error::TenantryAxumError;
pub use identity::{AuthenticatedUser, USER_EMAIL_HEADER};
pub use middleware::resolve_tenant;
pub use state::{PartitionConnections, TenantryAxumState};
