//! # tenantry-cache
//!
//! Backends for the [`CacheStore`](tenantry_core::CacheStore) contract:
//!
//! - [`MemoryCache`]: process-local map with per-key expiry, used in
//!   development and tests. Carries fault-injection helpers (outage,
//!   latency, write log) so callers can test their degraded paths.
//! - `RedisCache` (feature `redis`): shared cache over a lazily opened
//!   multiplexed connection manager.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;

pub use memory::{CacheWrite, MemoryCache, MemoryCachePurger};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

pub use tenantry_core::{CacheError, CacheResult, CacheStore};
