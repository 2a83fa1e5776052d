mod common;

use tracing_test::traced_test;

use common::{directory, email, harness, harness_with, ALICE};
use tenantry_cache::CacheWrite;
use tenantry_core::{ErrorKind, TenantId, TenantryError, TenantrySettings};
use tenantry_resolver::{BackgroundEvent, SwitchError, SwitchOutcome};
use tenantry_store::DIRECTORY_COLLECTION;

#[tokio::test]
async fn switching_to_the_active_tenant_writes_nothing() {
    let h = harness();
    h.seed_alice();
    let before = h.cache_alice_on_acme().await;

    for _ in 0..3 {
        let report = h.services.switch(&email(ALICE), &TenantId::new("acme")).await.unwrap();
        assert_eq!(report.outcome, SwitchOutcome::AlreadyActive);
        assert_eq!(report.tenant.tenant_id, TenantId::new("acme"));
        assert!(!report.discard_client_state);
    }

    tokio::task::yield_now().await;
    assert!(h.cache.write_log().is_empty());
    assert_eq!(h.db.write_count(), 0);
    assert_eq!(h.cached_value(ALICE), Some(before));
}

#[tokio::test]
async fn already_active_also_holds_on_a_cache_miss() {
    let h = harness();
    h.seed_alice();

    let report = h.services.switch(&email(ALICE), &TenantId::new("acme")).await.unwrap();
    assert_eq!(report.outcome, SwitchOutcome::AlreadyActive);
    assert!(h.cache.write_log().is_empty());
    assert_eq!(h.db.write_count(), 0);
}

#[tokio::test]
async fn missing_identity_in_target_leaves_cache_unchanged() {
    let h = harness();
    h.seed_alice();
    let before = h.cache_alice_on_acme().await;

    let err = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap_err();

    assert_eq!(err, SwitchError::NoIdentityInTarget(TenantId::new("globex")));
    assert_eq!(err.reason(), "no-identity-in-target");
    assert!(err.is_client_correctable());
    assert!(h.cache.write_log().is_empty());
    assert_eq!(h.cached_value(ALICE), Some(before));
}

#[tokio::test]
async fn switch_invalidates_derived_keys_before_commit() {
    let mut h = harness();
    h.seed_alice();
    h.seed_identity("globex_db", ALICE, "u-globex-9");
    h.cache_alice_on_acme().await;

    let report = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap();
    assert_eq!(report.outcome, SwitchOutcome::Switched);
    assert!(report.discard_client_state);
    assert!(report.warnings.is_empty());
    assert!(report.tenant.last_switched_at.is_some());

    let log = h.cache.write_log();
    let derived = h.keys().derived_keys(&email(ALICE));
    assert_eq!(log.len(), derived.len() + 1);
    for (write, key) in log.iter().zip(&derived) {
        assert_eq!(write, &CacheWrite::Del { key: key.clone() });
    }
    assert_eq!(
        log.last(),
        Some(&CacheWrite::Set {
            key: h.context_key(ALICE),
            ttl: h.settings.cache_ttl,
        })
    );

    let cached = h.cached_value(ALICE).unwrap();
    assert_eq!(cached.active.tenant_id, TenantId::new("globex"));
    assert_eq!(cached.active.partition_name.as_str(), "globex_db");
    assert_eq!(cached.identity.user_id, "u-globex-9");
    assert!(cached.available.contains(&cached.active.tenant_id));

    match h.next_event().await {
        BackgroundEvent::SwitchRecorded { tenant_id, .. } => assert_eq!(tenant_id, "globex"),
        other => panic!("unexpected event: {other:?}"),
    }
    let record = &h.db.documents(&directory(), DIRECTORY_COLLECTION)[0];
    assert_eq!(record["active_tenant"], "globex");
}

#[tokio::test]
async fn switch_from_a_cold_cache_uses_the_directory() {
    let h = harness();
    h.seed_alice();
    h.seed_identity("globex_db", ALICE, "u-globex-9");

    let report = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap();
    assert_eq!(report.outcome, SwitchOutcome::Switched);
    assert_eq!(h.cached_value(ALICE).unwrap().available.len(), 2);
}

#[tokio::test]
async fn non_member_is_rejected_without_writes() {
    let h = harness();
    h.seed_alice();
    h.cache_alice_on_acme().await;

    let err = h
        .services
        .switch(&email(ALICE), &TenantId::new("initech"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "not-a-member");
    assert!(h.cache.write_log().is_empty());

    let public: TenantryError = err.into();
    assert_eq!(public.kind, ErrorKind::NotFound);
    assert_eq!(public.reason(), Some("not-a-member"));
}

#[tokio::test]
async fn user_without_assignment_is_rejected() {
    let h = harness();

    let err = h
        .services
        .switch(&email("nobody@example.com"), &TenantId::new("acme"))
        .await
        .unwrap_err();
    assert_eq!(err, SwitchError::NoAssignmentData);
    assert_eq!(err.reason(), "no-assignment-data");
}

#[tokio::test]
async fn unreachable_directory_fails_the_switch() {
    let h = harness();
    h.seed_alice();
    h.db.set_unreachable(true);

    let err = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Storage(_)));
    assert!(!err.is_client_correctable());

    let public: TenantryError = err.into();
    assert_eq!(public.code(), 500);
    assert_eq!(public.reason(), Some("internal-error"));
}

#[tokio::test]
async fn failed_invalidation_aborts_before_commit() {
    let h = harness();
    h.seed_alice();
    h.seed_identity("globex_db", ALICE, "u-globex-9");
    let before = h.cache_alice_on_acme().await;

    // Membership comes from the directory, then invalidation hits the outage.
    h.cache.set_unreachable(true);

    let err = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Storage(_)));

    h.cache.set_unreachable(false);
    assert_eq!(h.cached_value(ALICE), Some(before));
}

#[tokio::test]
#[traced_test]
async fn failed_switch_record_is_logged_and_cache_kept() {
    let mut h = harness();
    h.seed_alice();
    h.seed_identity("globex_db", ALICE, "u-globex-9");
    h.cache_alice_on_acme().await;

    let report = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap();
    assert_eq!(report.outcome, SwitchOutcome::Switched);

    // The worker has not run yet; the directory goes down first.
    h.db.set_unreachable(true);

    match h.next_event().await {
        BackgroundEvent::SwitchRecordFailed { tenant_id, .. } => assert_eq!(tenant_id, "globex"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(logs_contain("Failed to record tenant switch"));
    assert_eq!(
        h.cached_value(ALICE).unwrap().active.tenant_id,
        TenantId::new("globex")
    );
}

#[tokio::test]
async fn saturated_queue_is_reported_as_a_warning() {
    let settings = TenantrySettings {
        background_capacity: 1,
        ..TenantrySettings::default()
    };
    let h = harness_with(settings);
    h.seed_alice();
    h.seed_identity("globex_db", ALICE, "u-globex-9");
    h.db.insert(
        &directory(),
        DIRECTORY_COLLECTION,
        serde_json::json!({
            "email": "erin@example.com",
            "tenants": [{"tenantId": "acme", "partitionName": "acme_db"}]
        }),
    );
    h.cache_alice_on_acme().await;

    // Fills the single queue slot before the worker gets to run.
    h.services.resolve(&email("erin@example.com"), None).await;

    let report = h
        .services
        .switch(&email(ALICE), &TenantId::new("globex"))
        .await
        .unwrap();
    assert_eq!(report.outcome, SwitchOutcome::Switched);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("record-switch"));
}
