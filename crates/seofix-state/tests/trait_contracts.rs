//! Trait contract tests for TenantStore.
//!
//! Every conforming implementation must pass the same assertions; each
//! contract is run against the in-memory fake and the SurrealDB backend.

use chrono::Utc;
use seofix_state::fakes::MemoryTenantStore;
use seofix_state::storage_traits::*;
use seofix_state::{
    Features, PlanTier, Quota, StorageError, SurrealTenantStore, TenantConfig, TenantId,
    TenantStatus, UsageRecord,
};

fn sample_tenant(id: &str, fixes: Quota) -> TenantConfig {
    let now = Utc::now();
    TenantConfig {
        id: TenantId::from(id),
        name: format!("{id} inc"),
        domain: format!("{id}.example.com"),
        plan: PlanTier::Starter,
        features: Features {
            audits_per_month: Quota::Limited(4),
            pages_per_audit: Quota::Limited(100),
            fixes_per_month: fixes,
            competitor_analysis: false,
            white_label: false,
            api_access: false,
            priority_support: false,
        },
        cms: None,
        status: TenantStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

async fn contract_put_then_get(store: &dyn TenantStore) {
    let tenant = sample_tenant("t-get", Quota::Limited(3));
    store.put_tenant(&tenant).await.unwrap();
    let back = store.get_tenant(&tenant.id).await.unwrap();
    assert_eq!(back.id, tenant.id);
    assert_eq!(back.features, tenant.features);
    assert_eq!(back.status, TenantStatus::Active);
}

async fn contract_put_replaces(store: &dyn TenantStore) {
    let mut tenant = sample_tenant("t-replace", Quota::Limited(2));
    store.put_tenant(&tenant).await.unwrap();
    tenant.features.fixes_per_month = Quota::Limited(1);
    tenant.status = TenantStatus::Suspended;
    store.put_tenant(&tenant).await.unwrap();

    let back = store.get_tenant(&tenant.id).await.unwrap();
    assert_eq!(back.features.fixes_per_month, Quota::Limited(1));
    assert_eq!(back.status, TenantStatus::Suspended);
    let all = store.list_tenants().await.unwrap();
    assert_eq!(all.iter().filter(|t| t.id == tenant.id).count(), 1);
}

async fn contract_missing_tenant(store: &dyn TenantStore) {
    let err = store
        .get_tenant(&TenantId::from("does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TenantNotFound { .. }));
}

async fn contract_usage_is_scoped_and_ordered(store: &dyn TenantStore) {
    let a = TenantId::from("usage-a");
    let b = TenantId::from("usage-b");
    for (i, tenant) in [&a, &b, &a].iter().enumerate() {
        let record = UsageRecord::new(
            (*tenant).clone(),
            "fix",
            0.25,
            serde_json::json!({ "seq": i }),
        );
        store.append_usage(&record).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let usage_a = store.usage_for(&a).await.unwrap();
    assert_eq!(usage_a.len(), 2);
    assert!(usage_a.iter().all(|r| r.tenant_id == a));
    assert_eq!(usage_a[0].details["seq"], 0);
    assert_eq!(usage_a[1].details["seq"], 2);
    assert_eq!(store.usage_for(&b).await.unwrap().len(), 1);
}

async fn contract_unlimited_quota_survives(store: &dyn TenantStore) {
    let tenant = sample_tenant("t-unlimited", Quota::Unlimited);
    store.put_tenant(&tenant).await.unwrap();
    let back = store.get_tenant(&tenant.id).await.unwrap();
    assert_eq!(back.features.fixes_per_month, Quota::Unlimited);
}

// ===========================================================================
// MemoryTenantStore
// ===========================================================================

#[tokio::test]
async fn memory_put_then_get() {
    contract_put_then_get(&MemoryTenantStore::new()).await;
}

#[tokio::test]
async fn memory_put_replaces() {
    contract_put_replaces(&MemoryTenantStore::new()).await;
}

#[tokio::test]
async fn memory_missing_tenant() {
    contract_missing_tenant(&MemoryTenantStore::new()).await;
}

#[tokio::test]
async fn memory_usage_is_scoped_and_ordered() {
    contract_usage_is_scoped_and_ordered(&MemoryTenantStore::new()).await;
}

#[tokio::test]
async fn memory_unlimited_quota_survives() {
    contract_unlimited_quota_survives(&MemoryTenantStore::new()).await;
}

#[tokio::test]
async fn memory_with_tenants_seeds_store() {
    let store = MemoryTenantStore::with_tenants([
        sample_tenant("seed-1", Quota::Limited(1)),
        sample_tenant("seed-2", Quota::Limited(1)),
    ]);
    let all = store.list_tenants().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, TenantId::from("seed-1"));
}

// ===========================================================================
// SurrealTenantStore
// ===========================================================================

#[tokio::test]
async fn surreal_put_then_get() {
    let store = SurrealTenantStore::in_memory().await.unwrap();
    contract_put_then_get(&store).await;
}

#[tokio::test]
async fn surreal_put_replaces() {
    let store = SurrealTenantStore::in_memory().await.unwrap();
    contract_put_replaces(&store).await;
}

#[tokio::test]
async fn surreal_missing_tenant() {
    let store = SurrealTenantStore::in_memory().await.unwrap();
    contract_missing_tenant(&store).await;
}

#[tokio::test]
async fn surreal_usage_is_scoped_and_ordered() {
    let store = SurrealTenantStore::in_memory().await.unwrap();
    contract_usage_is_scoped_and_ordered(&store).await;
}

#[tokio::test]
async fn surreal_unlimited_quota_survives() {
    let store = SurrealTenantStore::in_memory().await.unwrap();
    contract_unlimited_quota_survives(&store).await;
}

#[tokio::test]
async fn surreal_file_backend_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("db");
    let url = format!("surrealkv://{}", path.display());
    let store = SurrealTenantStore::connect(&url).await.unwrap();
    assert!(path.exists());

    store
        .put_tenant(&sample_tenant("durable", Quota::Limited(5)))
        .await
        .unwrap();
    let back = store.get_tenant(&TenantId::from("durable")).await.unwrap();
    assert_eq!(back.features.fixes_per_month, Quota::Limited(5));
}
