use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use tenantry_core::{PartitionName, PartitionSettings};
use tenantry_store::{
    ConnectionManager, DatabaseConnector, DocumentFilter, MemoryConnector, MemoryDocumentDb,
    PartitionHandle, RetryPolicy, StoreError,
};

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(200),
        deadline: Duration::from_secs(5),
    }
}

fn manager(connector: MemoryConnector, attempts: u32) -> Arc<ConnectionManager<MemoryConnector>> {
    Arc::new(ConnectionManager::new(
        connector,
        policy(attempts),
        PartitionSettings::default(),
    ))
}

#[tokio::test]
async fn connects_lazily_once_for_concurrent_callers() {
    let connector = MemoryConnector::new(MemoryDocumentDb::new());
    let mgr = manager(connector.clone(), 3);
    assert!(!mgr.is_connected().await);
    assert_eq!(connector.attempt_count(), 0);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let mgr = mgr.clone();
        tasks.push(tokio::spawn(async move { mgr.client().await.map(|_| ()) }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(mgr.connect_count(), 1);
    assert!(mgr.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn retries_until_a_connect_succeeds() {
    let connector = MemoryConnector::new(MemoryDocumentDb::new());
    connector.fail_next(2);
    let mgr = manager(connector.clone(), 3);

    mgr.client().await.unwrap();
    assert_eq!(connector.attempt_count(), 3);
    assert_eq!(mgr.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let connector = MemoryConnector::new(MemoryDocumentDb::new());
    connector.fail_next(10);
    let mgr = manager(connector.clone(), 3);

    let err = mgr.client().await.err().unwrap();
    let store_err = err.downcast_ref::<StoreError>().unwrap();
    assert!(store_err.is_fatal());
    match store_err {
        StoreError::ConnectExhausted { attempts, endpoint, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(endpoint, "memory://");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(connector.attempt_count(), 3);
    assert!(!mgr.is_connected().await);
}

struct HangingConnector;

#[async_trait]
impl DatabaseConnector for HangingConnector {
    type Client = MemoryDocumentDb;

    async fn connect(&self) -> Result<Self::Client> {
        std::future::pending().await
    }

    fn endpoint(&self) -> String {
        "hanging://".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn elapsed_deadline_bounds_a_hanging_connect() {
    let mgr = ConnectionManager::new(
        HangingConnector,
        RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(100),
            deadline: Duration::from_secs(1),
        },
        PartitionSettings::default(),
    );

    let started = tokio::time::Instant::now();
    let err = mgr.client().await.err().unwrap();
    assert!(started.elapsed() <= Duration::from_secs(1) + Duration::from_millis(10));
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::ConnectExhausted { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn shutdown_forces_a_reconnect() {
    let connector = MemoryConnector::new(MemoryDocumentDb::new());
    let mgr = manager(connector.clone(), 3);

    mgr.client().await.unwrap();
    mgr.shutdown().await;
    assert!(!mgr.is_connected().await);

    mgr.ping(Duration::from_secs(1)).await.unwrap();
    assert_eq!(mgr.connect_count(), 2);
}

#[tokio::test]
async fn partition_handles_are_scoped() {
    let db = MemoryDocumentDb::new();
    let mgr = manager(MemoryConnector::new(db.clone()), 3);
    let acme = PartitionName::new("portal_acme").unwrap();
    let globex = PartitionName::new("portal_globex").unwrap();

    let filter = DocumentFilter::by("email", "ana@acme.io");
    mgr.partition(&acme)
        .await
        .unwrap()
        .upsert_one("users", &filter, json!({"email": "ana@acme.io", "userId": "u-1"}))
        .await
        .unwrap();

    let handle = mgr.partition(&globex).await.unwrap();
    assert_eq!(handle.partition(), &globex);
    assert!(handle.find_one("users", &filter).await.unwrap().is_none());
    assert_eq!(db.documents(&acme, "users").len(), 1);
    assert_eq!(db.write_count(), 1);
}

#[tokio::test]
async fn erased_handles_keep_their_partition() {
    let db = MemoryDocumentDb::new();
    let acme = PartitionName::new("portal_acme").unwrap();
    db.insert(&acme, "payslips", json!({"userId": "u-1", "net": 1200}));
    let mgr = manager(MemoryConnector::new(db), 3);

    let handle: PartitionHandle = mgr.partition(&acme).await.unwrap().erased();

    assert_eq!(handle.partition(), &acme);
    let doc = handle
        .find_one("payslips", &DocumentFilter::by("userId", "u-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["net"], 1200);
}

#[tokio::test]
async fn directory_and_legacy_use_configured_partitions() {
    let mgr = manager(MemoryConnector::new(MemoryDocumentDb::new()), 3);
    let settings = PartitionSettings::default();

    assert_eq!(mgr.directory().await.unwrap().partition(), &settings.directory);
    assert_eq!(mgr.legacy().await.unwrap().partition(), &settings.legacy);
}
