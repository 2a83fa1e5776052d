use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use tenantry_core::{
    AuthoritativeStore, EmploymentStatus, IntegrationProfile, NormalizedEmail, PartitionName,
    PartitionSettings, TenantId,
};
use tenantry_store::{
    ConnectionManager, DocumentAuthoritativeStore, MemoryConnector, MemoryDocumentDb, RetryPolicy,
    DIRECTORY_COLLECTION, IDENTITY_COLLECTION, SWITCH_LOG_COLLECTION,
};

fn store(db: &MemoryDocumentDb) -> DocumentAuthoritativeStore<MemoryConnector> {
    let mgr = ConnectionManager::new(
        MemoryConnector::new(db.clone()),
        RetryPolicy::default(),
        PartitionSettings::default(),
    );
    DocumentAuthoritativeStore::new(Arc::new(mgr))
}

fn directory() -> PartitionName {
    PartitionSettings::default().directory
}

fn email(raw: &str) -> NormalizedEmail {
    NormalizedEmail::parse(raw).unwrap()
}

fn seed_directory(db: &MemoryDocumentDb, active: Option<&str>) {
    db.insert(
        &directory(),
        DIRECTORY_COLLECTION,
        json!({
            "email": "ana@acme.io",
            "active_tenant": active,
            "tenants": [
                {"tenantId": "acme", "partitionName": "portal_acme", "displayName": "Acme"},
                {"tenantId": "globex", "displayName": "Globex", "integrationProfile": "payroll-export"}
            ]
        }),
    );
}

#[tokio::test]
async fn assignment_uses_directory_active_tenant() {
    let db = MemoryDocumentDb::new();
    seed_directory(&db, Some("globex"));

    let assignment = store(&db)
        .lookup_assignment(&email("Ana@Acme.io"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(assignment.active.tenant_id, TenantId::new("globex"));
    assert_eq!(assignment.active.partition_name, None);
    assert_eq!(assignment.active.integration_profile, IntegrationProfile::PayrollExport);
    assert_eq!(assignment.available.len(), 2);
}

#[tokio::test]
async fn assignment_falls_back_to_first_tenant() {
    let db = MemoryDocumentDb::new();
    seed_directory(&db, Some("initech"));

    let assignment = store(&db)
        .lookup_assignment(&email("ana@acme.io"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.active.tenant_id, TenantId::new("acme"));
    assert_eq!(
        assignment.active.partition_name,
        PartitionName::new("portal_acme")
    );
}

#[tokio::test]
async fn unknown_login_and_empty_tenant_list_have_no_assignment() {
    let db = MemoryDocumentDb::new();
    db.insert(
        &directory(),
        DIRECTORY_COLLECTION,
        json!({"email": "empty@acme.io", "tenants": []}),
    );
    let store = store(&db);

    assert!(store.lookup_assignment(&email("nobody@acme.io")).await.unwrap().is_none());
    assert!(store.lookup_assignment(&email("empty@acme.io")).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_directory_document_is_an_error() {
    let db = MemoryDocumentDb::new();
    db.insert(
        &directory(),
        DIRECTORY_COLLECTION,
        json!({"email": "ana@acme.io", "tenants": "acme"}),
    );

    assert!(store(&db).lookup_assignment(&email("ana@acme.io")).await.is_err());
}

#[tokio::test]
async fn identity_is_read_from_the_tenant_partition() {
    let db = MemoryDocumentDb::new();
    let acme = PartitionName::new("portal_acme").unwrap();
    db.insert(
        &acme,
        IDENTITY_COLLECTION,
        json!({"email": "ana@acme.io", "userId": "u-7", "employeeId": "E-7", "role": "manager", "status": "on-leave"}),
    );
    let store = store(&db);

    let identity = store
        .lookup_identity(&acme, &email("ana@acme.io"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.user_id, "u-7");
    assert_eq!(identity.employee_id.as_deref(), Some("E-7"));
    assert_eq!(identity.status, EmploymentStatus::OnLeave);

    let other = PartitionName::new("portal_globex").unwrap();
    assert!(store.lookup_identity(&other, &email("ana@acme.io")).await.unwrap().is_none());
}

#[tokio::test]
async fn record_switch_updates_directory_and_history() {
    let db = MemoryDocumentDb::new();
    seed_directory(&db, Some("acme"));
    let store = store(&db);
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();

    store
        .record_switch(&email("ana@acme.io"), &TenantId::new("globex"), at)
        .await
        .unwrap();

    let history = db.documents(&directory(), SWITCH_LOG_COLLECTION);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["tenant_id"], "globex");

    let assignment = store.lookup_assignment(&email("ana@acme.io")).await.unwrap().unwrap();
    assert_eq!(assignment.active.tenant_id, TenantId::new("globex"));
    let record = &db.documents(&directory(), DIRECTORY_COLLECTION)[0];
    assert_eq!(record["active_tenant"], "globex");
    assert!(record["last_switched_at"].is_string());
}

#[tokio::test]
async fn mixed_case_logins_read_and_write_lowercased_documents() {
    let db = MemoryDocumentDb::new();
    seed_directory(&db, Some("acme"));
    let store = store(&db);
    let login = email("  Ana@ACME.io ");
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();

    assert!(store.lookup_assignment(&login).await.unwrap().is_some());
    store.record_switch(&login, &TenantId::new("globex"), at).await.unwrap();

    let record = &db.documents(&directory(), DIRECTORY_COLLECTION)[0];
    assert_eq!(record["email"], "ana@acme.io");
    let history = db.documents(&directory(), SWITCH_LOG_COLLECTION);
    assert_eq!(history[0]["email"], "ana@acme.io");
}

#[tokio::test]
async fn unreachable_store_surfaces_errors() {
    let db = MemoryDocumentDb::new();
    seed_directory(&db, None);
    db.set_unreachable(true);

    assert!(store(&db).lookup_assignment(&email("ana@acme.io")).await.is_err());
}
