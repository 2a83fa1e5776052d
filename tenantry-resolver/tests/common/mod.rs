#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use tenantry_cache::MemoryCache;
use tenantry_core::{
    AuthoritativeStore, AvailableTenantSet, CacheKeys, CacheStore, EmploymentStatus,
    NormalizedEmail, PartitionName, PartitionSettings, TenantCacheValue, TenantContext, TenantId,
    TenantSummary, TenantrySettings, UserIdentityInTenant,
};
use tenantry_resolver::{BackgroundEvent, TenantServices};
use tenantry_store::{
    ConnectionManager, DocumentAuthoritativeStore, MemoryConnector, MemoryDocumentDb, RetryPolicy,
    DIRECTORY_COLLECTION, IDENTITY_COLLECTION,
};

pub const ALICE: &str = "alice@example.com";

pub struct Harness {
    pub cache: MemoryCache,
    pub db: MemoryDocumentDb,
    pub services: TenantServices,
    pub events: broadcast::Receiver<BackgroundEvent>,
    pub settings: TenantrySettings,
}

pub fn partition(name: &str) -> PartitionName {
    PartitionName::new(name).unwrap()
}

pub fn email(raw: &str) -> NormalizedEmail {
    NormalizedEmail::parse(raw).unwrap()
}

pub fn directory() -> PartitionName {
    PartitionSettings::default().directory
}

pub fn harness() -> Harness {
    harness_with(TenantrySettings::default())
}

pub fn harness_with(settings: TenantrySettings) -> Harness {
    harness_with_store(settings, |store| -> Arc<dyn AuthoritativeStore> { Arc::new(store) })
}

/// Like [`harness_with`], with the directory store wrapped by `wrap`.
pub fn harness_with_store<F>(settings: TenantrySettings, wrap: F) -> Harness
where
    F: FnOnce(DocumentAuthoritativeStore<MemoryConnector>) -> Arc<dyn AuthoritativeStore>,
{
    let cache = MemoryCache::new();
    let db = MemoryDocumentDb::new();
    let connections = ConnectionManager::new(
        MemoryConnector::new(db.clone()),
        RetryPolicy::from(&settings.connect),
        settings.partitions.clone(),
    );
    let store = DocumentAuthoritativeStore::new(Arc::new(connections));

    let (services, _worker) = TenantServices::new(&settings, Arc::new(cache.clone()), wrap(store));
    let events = services.events();

    Harness {
        cache,
        db,
        services,
        events,
        settings,
    }
}

impl Harness {
    /// Alice may use acme (acme_db, active) and globex (globex_db).
    pub fn seed_alice(&self) {
        self.db.insert(
            &directory(),
            DIRECTORY_COLLECTION,
            json!({
                "email": ALICE,
                "active_tenant": "acme",
                "tenants": [
                    {"tenantId": "acme", "partitionName": "acme_db", "displayName": "Acme"},
                    {"tenantId": "globex", "partitionName": "globex_db", "displayName": "Globex"}
                ]
            }),
        );
        self.seed_identity("acme_db", ALICE, "u-acme-1");
    }

    pub fn seed_identity(&self, partition_name: &str, login: &str, user_id: &str) {
        self.db.insert(
            &partition(partition_name),
            IDENTITY_COLLECTION,
            json!({"email": login, "userId": user_id, "role": "employee", "status": "active"}),
        );
    }

    /// Writes a cached context for alice with acme active, then clears the write log.
    pub async fn cache_alice_on_acme(&self) -> TenantCacheValue {
        let available = AvailableTenantSet::new(vec![
            TenantSummary::new("acme")
                .with_partition(partition("acme_db"))
                .with_display_name("Acme"),
            TenantSummary::new("globex")
                .with_partition(partition("globex_db"))
                .with_display_name("Globex"),
        ]);
        let active = TenantContext::from_summary(
            available.get(&TenantId::new("acme")).unwrap(),
            partition("acme_db"),
        );
        let identity = UserIdentityInTenant {
            user_id: "u-acme-1".to_string(),
            employee_id: None,
            role: "employee".to_string(),
            status: EmploymentStatus::Active,
        };
        let value = TenantCacheValue::new(active, available, identity).unwrap();
        self.cache
            .set(
                &self.context_key(ALICE),
                serde_json::to_string(&value).unwrap(),
                self.settings.cache_ttl,
            )
            .await
            .unwrap();
        self.cache.clear_write_log();
        value
    }

    pub fn context_key(&self, login: &str) -> String {
        self.keys().context_key(&email(login))
    }

    pub fn keys(&self) -> CacheKeys {
        CacheKeys::new(self.settings.derived_scopes.clone())
    }

    pub fn cached_value(&self, login: &str) -> Option<TenantCacheValue> {
        self.cache
            .peek(&self.context_key(login))
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// Waits for the next background event.
    pub async fn next_event(&mut self) -> BackgroundEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no background event within 5s")
            .expect("event channel closed")
    }
}
