//! # Tenantry Configuration
//!
//! Configuration is a flat string key/value store, filled by the
//! application from whatever source it likes (environment, `.env`, a
//! secrets manager), then frozen into a [`TenantryConfigSnapshot`] and
//! parsed once into typed [`TenantrySettings`].
//!
//! ```rust
//! use tenantry_core::{TenantryConfig, TenantrySettings};
//!
//! let mut config = TenantryConfig::new();
//! config.set("cache.ttl_seconds", "3600");
//! config.set("partitions.default", "portal_default");
//!
//! let settings = TenantrySettings::from_snapshot(&config.snapshot()).unwrap();
//! assert_eq!(settings.cache_ttl.as_secs(), 3600);
//! ```
//!
//! ## Environment overrides
//! `TENANTRY__CACHE__TTL_SECONDS=600` becomes `cache.ttl_seconds = 600`
//! after [`TenantryConfig::load_env`] with prefix `TENANTRY__`.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::DerivedScope;
use crate::errors::TenantryError;
use crate::tenant::PartitionName;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_BACKOFF_MS: u64 = 200;
pub const DEFAULT_CONNECT_DEADLINE_MS: u64 = 5_000;
pub const DEFAULT_DIRECTORY_PARTITION: &str = "tenant_directory";
pub const DEFAULT_LEGACY_PARTITION: &str = "portal_legacy";
pub const DEFAULT_FALLBACK_PARTITION: &str = "portal_default";
pub const DEFAULT_LEGACY_TENANT: &str = "portal";
pub const DEFAULT_BACKGROUND_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub struct TenantryConfig {
    values: HashMap<String, String>,
}

impl TenantryConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every environment variable starting with `prefix` into the store.
    ///
    /// `TENANTRY__REDIS__URL` → `redis.url`. Returns how many keys were set.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(std::env::vars(), prefix)
    }

    pub fn load_vars<I>(&mut self, vars: I, prefix: &str) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> TenantryConfigSnapshot {
        TenantryConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TenantryConfigSnapshot {
    map: HashMap<String, String>,
}

impl TenantryConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Parsed value, or `default` when missing. Unparseable values are
    /// logged and replaced by the default.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            None => default,
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(key, value = raw, "invalid config value, using default");
                    default
                }
            },
        }
    }
}

/// Connection retry bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub deadline: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_CONNECT_BACKOFF_MS),
            deadline: Duration::from_millis(DEFAULT_CONNECT_DEADLINE_MS),
        }
    }
}

/// Fixed partitions and the heuristic's special case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSettings {
    /// Cross-tenant partition holding the assignment directory.
    pub directory: PartitionName,
    /// Partition of the pre-multi-tenant deployment.
    pub legacy: PartitionName,
    /// Used when nothing at all is known about the user.
    pub fallback: PartitionName,
    /// Tenant identifier that maps to `legacy` instead of its own prefix.
    pub legacy_tenant: String,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            directory: PartitionName(DEFAULT_DIRECTORY_PARTITION.to_string()),
            legacy: PartitionName(DEFAULT_LEGACY_PARTITION.to_string()),
            fallback: PartitionName(DEFAULT_FALLBACK_PARTITION.to_string()),
            legacy_tenant: DEFAULT_LEGACY_TENANT.to_string(),
        }
    }
}

/// Typed view of the configuration used by the resolver and coordinator.
#[derive(Debug, Clone)]
pub struct TenantrySettings {
    pub cache_ttl: Duration,
    pub cache_timeout: Duration,
    pub store_timeout: Duration,
    pub derived_scopes: Vec<DerivedScope>,
    pub connect: ConnectSettings,
    pub partitions: PartitionSettings,
    pub background_capacity: usize,
}

impl Default for TenantrySettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            derived_scopes: DerivedScope::defaults(),
            connect: ConnectSettings::default(),
            partitions: PartitionSettings::default(),
            background_capacity: DEFAULT_BACKGROUND_CAPACITY,
        }
    }
}

impl TenantrySettings {
    pub fn from_snapshot(cfg: &TenantryConfigSnapshot) -> Result<Self, TenantryError> {
        let defaults = Self::default();

        let derived_scopes = match cfg.get("cache.derived_scopes") {
            Some(raw) => raw.split(',').filter_map(DerivedScope::new).collect(),
            None => defaults.derived_scopes,
        };

        let connect = ConnectSettings {
            max_attempts: cfg
                .parse_or("connect.max_attempts", DEFAULT_CONNECT_ATTEMPTS)
                .max(1),
            backoff: Duration::from_millis(
                cfg.parse_or("connect.backoff_ms", DEFAULT_CONNECT_BACKOFF_MS),
            ),
            deadline: Duration::from_millis(
                cfg.parse_or("connect.deadline_ms", DEFAULT_CONNECT_DEADLINE_MS),
            ),
        };

        let partitions = PartitionSettings {
            directory: partition_or(cfg, "partitions.directory", defaults.partitions.directory)?,
            legacy: partition_or(cfg, "partitions.legacy", defaults.partitions.legacy)?,
            fallback: partition_or(cfg, "partitions.default", defaults.partitions.fallback)?,
            legacy_tenant: cfg
                .get("heuristic.legacy_tenant")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or(defaults.partitions.legacy_tenant),
        };

        Ok(Self {
            cache_ttl: Duration::from_secs(
                cfg.parse_or("cache.ttl_seconds", DEFAULT_CACHE_TTL_SECS),
            ),
            cache_timeout: Duration::from_millis(
                cfg.parse_or("cache.timeout_ms", DEFAULT_CACHE_TIMEOUT_MS),
            ),
            store_timeout: Duration::from_millis(
                cfg.parse_or("store.timeout_ms", DEFAULT_STORE_TIMEOUT_MS),
            ),
            derived_scopes,
            connect,
            partitions,
            background_capacity: cfg
                .parse_or("background.capacity", DEFAULT_BACKGROUND_CAPACITY)
                .max(1),
        })
    }
}

fn partition_or(
    cfg: &TenantryConfigSnapshot,
    key: &str,
    default: PartitionName,
) -> Result<PartitionName, TenantryError> {
    match cfg.get(key) {
        None => Ok(default),
        Some(raw) => PartitionName::new(raw).ok_or_else(|| {
            TenantryError::bad_request(format!("config key '{key}' must not be empty"))
        }),
    }
}
