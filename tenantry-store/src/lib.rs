//! tenantry-store: partition-scoped database access for Tenantry.
//!
//! The [`ConnectionManager`] owns one lazily created client to the
//! multi-tenant document database and hands out [`PartitionHandle`]s for
//! whichever partition a request resolved to. The
//! [`DocumentAuthoritativeStore`] implements the tenant directory on top of
//! those handles.
//!
//! Backends:
//! - [`MemoryConnector`] / [`MemoryDocumentDb`]: in-process, for tests and dev.
//! - `TypeDBConnector` (feature `typedb`): each partition is a TypeDB database.

pub mod authoritative;
pub mod connector;
pub mod document;
pub mod error;
pub mod manager;
pub mod memory;
#[cfg(feature = "typedb")]
pub mod typedb;

pub use authoritative::{
    DocumentAuthoritativeStore, DIRECTORY_COLLECTION, IDENTITY_COLLECTION, SWITCH_LOG_COLLECTION,
};
pub use connector::{DatabaseConnector, RetryPolicy};
pub use document::{DocumentClient, DocumentFilter};
pub use error::{StoreError, StoreResult};
pub use manager::{ConnectionManager, PartitionHandle};
pub use memory::{MemoryConnector, MemoryDocumentDb};
#[cfg(feature = "typedb")]
pub use typedb::{TypeDBConnector, TypeDBDocuments};
