//! Access control and metering through the tenant registry.

use std::sync::Arc;

use serde_json::json;

use seofix_core::{Operation, SeofixError, TenantRegistration, TenantRegistry};
use seofix_state::fakes::MemoryTenantStore;
use seofix_state::{PlanTier, Quota, TenantId};

fn registry() -> Arc<TenantRegistry> {
    Arc::new(TenantRegistry::new(Arc::new(MemoryTenantStore::new())))
}

async fn register(registry: &TenantRegistry, plan: PlanTier) -> TenantId {
    registry
        .register(TenantRegistration {
            name: "Corner Bakery".into(),
            domain: "bakery.example".into(),
            plan,
            cms: None,
        })
        .await
        .unwrap()
        .id
}

// ---- Access rules ----

#[tokio::test]
async fn zero_quotas_deny_fix_and_audit() {
    let registry = registry();
    let id = register(&registry, PlanTier::Starter).await;
    let mut features = registry.resolve(&id).await.unwrap().features;
    features.fixes_per_month = Quota::Limited(0);
    features.audits_per_month = Quota::Limited(0);
    registry.update_features(&id, features).await.unwrap();

    let fix = registry.check_access(&id, "fix").await.unwrap();
    assert!(!fix.allowed);
    assert_eq!(fix.reason.as_deref(), Some("monthly fix quota exhausted"));
    assert_eq!(fix.remaining_quota, Some(Quota::Limited(0)));

    let audit = registry.check_access(&id, Operation::Audit).await.unwrap();
    assert!(!audit.allowed);
    assert_eq!(audit.reason.as_deref(), Some("monthly audit quota exhausted"));
}

#[tokio::test]
async fn competitor_analysis_follows_plan_flag() {
    let registry = registry();
    let starter = register(&registry, PlanTier::Starter).await;
    let pro = register(&registry, PlanTier::Professional).await;

    assert!(!registry
        .check_access(&starter, "competitor_analysis")
        .await
        .unwrap()
        .allowed);
    assert!(registry
        .check_access(&pro, "competitor_analysis")
        .await
        .unwrap()
        .allowed);
    assert!(!registry.check_access(&pro, "teleport").await.unwrap().allowed);
}

// ---- Metering ----

#[tokio::test]
async fn unlimited_quota_is_never_changed() {
    let registry = registry();
    let id = register(&registry, PlanTier::Enterprise).await;
    for _ in 0..5 {
        registry.record_usage(&id, "fix", json!({})).await.unwrap();
    }
    let tenant = registry.resolve(&id).await.unwrap();
    assert_eq!(tenant.features.fixes_per_month, Quota::Unlimited);
    assert_eq!(registry.usage(&id).await.unwrap().len(), 5);

    let stored = serde_json::to_value(&tenant.features).unwrap();
    assert_eq!(stored["fixes_per_month"], -1);
}

#[tokio::test]
async fn limited_quota_stops_at_zero_and_prices_records() {
    let registry = registry();
    let id = register(&registry, PlanTier::Starter).await;
    registry.record_usage(&id, "fix", json!({})).await.unwrap();
    registry.record_usage(&id, "fix", json!({})).await.unwrap();
    let audit = registry.record_usage(&id, "audit", json!({"pages": 12})).await.unwrap();

    let tenant = registry.resolve(&id).await.unwrap();
    assert_eq!(tenant.features.fixes_per_month, Quota::Limited(0));
    assert_eq!(tenant.features.audits_per_month, Quota::Limited(3));
    assert_eq!(audit.cost, 0.50);
    assert_eq!(audit.details["pages"], 12);

    let ledger = registry.usage(&id).await.unwrap();
    let total: f64 = ledger.iter().map(|r| r.cost).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn usage_for_unknown_tenant_is_not_found() {
    let registry = registry();
    let err = registry.usage(&TenantId::from("ghost")).await.unwrap_err();
    assert!(matches!(err, SeofixError::TenantNotFound(_)));
}

// ---- Reservations ----

#[tokio::test]
async fn concurrent_reservations_cannot_share_last_unit() {
    let registry = registry();
    let id = register(&registry, PlanTier::Starter).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            registry.reserve(&id, "fix").await.unwrap().allowed
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);

    // a released hold frees the unit again
    registry.release(&id, "fix").await;
    assert!(registry.reserve(&id, "fix").await.unwrap().allowed);
}

#[tokio::test]
async fn settled_reservation_spends_the_unit() {
    let registry = registry();
    let id = register(&registry, PlanTier::Starter).await;
    assert!(registry.reserve(&id, "fix").await.unwrap().allowed);
    registry.record_usage(&id, "fix", json!({})).await.unwrap();

    let after = registry.check_access(&id, "fix").await.unwrap();
    assert!(!after.allowed);
    assert_eq!(after.remaining_quota, Some(Quota::Limited(0)));
}
