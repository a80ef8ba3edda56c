//! Tenant registry over a `TenantStore`.
//!
//! Every read-modify-write for one tenant runs under that tenant's async
//! mutex. The mutex also guards the tenant's held reservations, which is what
//! stops two concurrent fixes from both spending the last unit of quota.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use seofix_state::{
    CmsCredentials, Features, PlanTier, Quota, StorageError, TenantConfig, TenantId, TenantStatus,
    TenantStore, UsageRecord,
};

use super::plans::{features_for, unit_price};
use super::{AccessDecision, Operation};
use crate::domain::{Result, SeofixError};
use crate::obs;

/// Input for creating a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRegistration {
    pub name: String,
    pub domain: String,
    pub plan: PlanTier,
    pub cms: Option<CmsCredentials>,
}

/// Reservations currently held for one tenant, by operation.
#[derive(Debug, Default)]
struct Holds {
    by_op: HashMap<Operation, u32>,
}

impl Holds {
    fn held(&self, op: &Operation) -> u32 {
        self.by_op.get(op).copied().unwrap_or(0)
    }

    fn take(&mut self, op: &Operation) {
        *self.by_op.entry(op.clone()).or_insert(0) += 1;
    }

    fn drop_one(&mut self, op: &Operation) -> bool {
        match self.by_op.get_mut(op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Per-tenant configuration, access control and metering.
pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
    slots: Mutex<HashMap<TenantId, Arc<tokio::sync::Mutex<Holds>>>>,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    fn slot(&self, tenant_id: &TenantId) -> Arc<tokio::sync::Mutex<Holds>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(tenant_id.clone()).or_default())
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub async fn resolve(&self, tenant_id: &TenantId) -> Result<TenantConfig> {
        match self.store.get_tenant(tenant_id).await {
            Ok(tenant) => Ok(tenant),
            Err(StorageError::TenantNotFound { .. }) => {
                Err(SeofixError::TenantNotFound(tenant_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<TenantConfig>> {
        Ok(self.store.list_tenants().await?)
    }

    pub async fn usage(&self, tenant_id: &TenantId) -> Result<Vec<UsageRecord>> {
        self.resolve(tenant_id).await?;
        Ok(self.store.usage_for(tenant_id).await?)
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// Decide whether `tenant_id` may perform `operation` right now.
    ///
    /// Rules, first failure wins: the tenant exists, is active, has quota (or
    /// the flag) for the operation. Unknown operations are denied.
    pub async fn check_access(
        &self,
        tenant_id: &TenantId,
        operation: impl Into<Operation>,
    ) -> Result<AccessDecision> {
        let op = operation.into();
        let slot = self.slot(tenant_id);
        let holds = slot.lock().await;
        let decision = self.decide(tenant_id, &op, &holds).await?;
        if let Some(reason) = &decision.reason {
            obs::emit_access_denied(tenant_id.as_str(), op.as_str(), reason);
        }
        Ok(decision)
    }

    /// Atomic check-and-hold. An allowed decision holds one unit until
    /// `record_usage` settles it or `release` drops it.
    pub async fn reserve(
        &self,
        tenant_id: &TenantId,
        operation: impl Into<Operation>,
    ) -> Result<AccessDecision> {
        let op = operation.into();
        let slot = self.slot(tenant_id);
        let mut holds = slot.lock().await;
        let decision = self.decide(tenant_id, &op, &holds).await?;
        match &decision.reason {
            None => {
                holds.take(&op);
                debug!(tenant_id = %tenant_id, operation = %op, held = holds.held(&op), "reservation held");
            }
            Some(reason) => obs::emit_access_denied(tenant_id.as_str(), op.as_str(), reason),
        }
        Ok(decision)
    }

    /// Drop a held reservation without spending it.
    pub async fn release(&self, tenant_id: &TenantId, operation: impl Into<Operation>) {
        let op = operation.into();
        let slot = self.slot(tenant_id);
        let mut holds = slot.lock().await;
        if holds.drop_one(&op) {
            debug!(tenant_id = %tenant_id, operation = %op, "reservation released");
        }
    }

    async fn decide(
        &self,
        tenant_id: &TenantId,
        op: &Operation,
        holds: &Holds,
    ) -> Result<AccessDecision> {
        let tenant = match self.resolve(tenant_id).await {
            Ok(tenant) => tenant,
            Err(SeofixError::TenantNotFound(_)) => {
                return Ok(AccessDecision::deny("tenant not found", None))
            }
            Err(e) => return Err(e),
        };
        if tenant.status != TenantStatus::Active {
            return Ok(AccessDecision::deny(
                format!("tenant is {}", tenant.status),
                None,
            ));
        }

        let features = &tenant.features;
        let metered = |quota: Quota, what: &str| {
            let remaining = quota.available(holds.held(op));
            if remaining.is_exhausted() {
                AccessDecision::deny(format!("{what} quota exhausted"), Some(remaining))
            } else {
                AccessDecision::allow(Some(remaining))
            }
        };

        Ok(match op {
            Operation::Fix => metered(features.fixes_per_month, "monthly fix"),
            Operation::Audit => metered(features.audits_per_month, "monthly audit"),
            Operation::CompetitorAnalysis if features.competitor_analysis => {
                AccessDecision::allow(None)
            }
            Operation::CompetitorAnalysis => {
                AccessDecision::deny("competitor analysis is not included in this plan", None)
            }
            Operation::ContentGeneration => AccessDecision::allow(None),
            Operation::Other(name) => AccessDecision::deny(format!("unknown operation '{name}'"), None),
        })
    }

    // -----------------------------------------------------------------------
    // Metering
    // -----------------------------------------------------------------------

    /// Spend one unit of `operation` and append a priced usage record.
    ///
    /// Limited quotas drop by one and never below zero; unlimited quotas are
    /// untouched. The usage record is written through the store before this
    /// returns. If it cannot be written the quota is put back and any held
    /// reservation stays held for the caller to release.
    pub async fn record_usage(
        &self,
        tenant_id: &TenantId,
        operation: impl Into<Operation>,
        details: serde_json::Value,
    ) -> Result<UsageRecord> {
        let op = operation.into();
        let slot = self.slot(tenant_id);
        let mut holds = slot.lock().await;

        let original = self.resolve(tenant_id).await?;
        let mut tenant = original.clone();
        let quota = match &op {
            Operation::Fix => Some(&mut tenant.features.fixes_per_month),
            Operation::Audit => Some(&mut tenant.features.audits_per_month),
            _ => None,
        };
        let (remaining, spent) = match quota {
            Some(q) if !q.is_unlimited() => {
                *q = q.consume();
                (q.to_string(), true)
            }
            Some(q) => (q.to_string(), false),
            None => ("n/a".to_string(), false),
        };
        if spent {
            tenant.updated_at = Utc::now();
            self.store.put_tenant(&tenant).await?;
        }

        let record = UsageRecord::new(tenant_id.clone(), op.as_str(), unit_price(&op), details);
        if let Err(e) = self.store.append_usage(&record).await {
            if spent {
                if let Err(restore) = self.store.put_tenant(&original).await {
                    warn!(
                        tenant_id = %tenant_id,
                        operation = %op,
                        error = %restore,
                        "could not restore quota after failed usage write"
                    );
                }
            }
            return Err(e.into());
        }
        holds.drop_one(&op);
        obs::emit_usage_recorded(tenant_id.as_str(), op.as_str(), record.cost, &remaining);
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Create an active tenant with the plan's default features.
    pub async fn register(&self, registration: TenantRegistration) -> Result<TenantConfig> {
        if registration.name.trim().is_empty() {
            return Err(SeofixError::Config("tenant name must not be empty".to_string()));
        }
        let now = Utc::now();
        let tenant = TenantConfig {
            id: TenantId::generate(),
            name: registration.name,
            domain: registration.domain,
            plan: registration.plan,
            features: features_for(registration.plan),
            cms: registration.cms,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.put_tenant(&tenant).await?;
        tracing::info!(event = "tenant.registered", tenant_id = %tenant.id, plan = %tenant.plan);
        Ok(tenant)
    }

    pub async fn set_status(&self, tenant_id: &TenantId, status: TenantStatus) -> Result<TenantConfig> {
        self.modify(tenant_id, |tenant| tenant.status = status).await
    }

    /// Replace a tenant's features, e.g. to grant a quota override.
    pub async fn update_features(
        &self,
        tenant_id: &TenantId,
        features: Features,
    ) -> Result<TenantConfig> {
        self.modify(tenant_id, move |tenant| tenant.features = features)
            .await
    }

    async fn modify<F>(&self, tenant_id: &TenantId, change: F) -> Result<TenantConfig>
    where
        F: FnOnce(&mut TenantConfig) + Send,
    {
        let slot = self.slot(tenant_id);
        let _holds = slot.lock().await;
        let mut tenant = self.resolve(tenant_id).await?;
        change(&mut tenant);
        tenant.updated_at = Utc::now();
        self.store.put_tenant(&tenant).await?;
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seofix_state::fakes::MemoryTenantStore;

    fn registry() -> TenantRegistry {
        TenantRegistry::new(Arc::new(MemoryTenantStore::new()))
    }

    fn registration(plan: PlanTier) -> TenantRegistration {
        TenantRegistration {
            name: "Bakery".into(),
            domain: "bakery.example".into(),
            plan,
            cms: None,
        }
    }

    #[tokio::test]
    async fn test_register_uses_plan_table() {
        let reg = registry();
        let tenant = reg.register(registration(PlanTier::Professional)).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.features, features_for(PlanTier::Professional));
        assert_eq!(reg.resolve(&tenant.id).await.unwrap(), tenant);
    }

    #[tokio::test]
    async fn test_register_rejects_blank_name() {
        let reg = registry();
        let mut r = registration(PlanTier::Starter);
        r.name = "  ".into();
        assert!(matches!(reg.register(r).await, Err(SeofixError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_denied_not_error() {
        let reg = registry();
        let d = reg.check_access(&TenantId::from("ghost"), "fix").await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.reason.as_deref(), Some("tenant not found"));
        assert!(matches!(
            reg.resolve(&TenantId::from("ghost")).await,
            Err(SeofixError::TenantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_checked_before_quota() {
        let reg = registry();
        let t = reg.register(registration(PlanTier::Starter)).await.unwrap();
        reg.set_status(&t.id, TenantStatus::Suspended).await.unwrap();
        let d = reg.check_access(&t.id, "fix").await.unwrap();
        assert_eq!(d.reason.as_deref(), Some("tenant is suspended"));
    }

    #[tokio::test]
    async fn test_reservation_hides_last_unit() {
        let reg = registry();
        let t = reg.register(registration(PlanTier::Starter)).await.unwrap();

        let first = reg.reserve(&t.id, "fix").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining_quota, Some(Quota::Limited(1)));

        let second = reg.reserve(&t.id, "fix").await.unwrap();
        assert!(!second.allowed);
        assert_eq!(second.remaining_quota, Some(Quota::Limited(0)));

        reg.release(&t.id, "fix").await;
        assert!(reg.check_access(&t.id, "fix").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_record_usage_settles_reservation() {
        let reg = registry();
        let t = reg.register(registration(PlanTier::Professional)).await.unwrap();
        reg.reserve(&t.id, "fix").await.unwrap();
        let rec = reg
            .record_usage(&t.id, "fix", serde_json::json!({"page": "/"}))
            .await
            .unwrap();
        assert_eq!(rec.cost, 0.25);

        let d = reg.check_access(&t.id, "fix").await.unwrap();
        assert_eq!(d.remaining_quota, Some(Quota::Limited(24)));
        assert_eq!(reg.usage(&t.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_denied() {
        let reg = registry();
        let t = reg.register(registration(PlanTier::Enterprise)).await.unwrap();
        let d = reg.check_access(&t.id, "launch_rockets").await.unwrap();
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("unknown operation"));
    }

    #[tokio::test]
    async fn test_update_features_overrides_quota() {
        let reg = registry();
        let t = reg.register(registration(PlanTier::Starter)).await.unwrap();
        let mut features = t.features.clone();
        features.fixes_per_month = Quota::Limited(0);
        reg.update_features(&t.id, features).await.unwrap();
        let d = reg.check_access(&t.id, "fix").await.unwrap();
        assert_eq!(d.reason.as_deref(), Some("monthly fix quota exhausted"));
    }

    #[tokio::test]
    async fn test_failed_usage_write_keeps_quota_and_hold() {
        let store = Arc::new(MemoryTenantStore::new());
        let reg = TenantRegistry::new(store.clone());
        let t = reg.register(registration(PlanTier::Starter)).await.unwrap();
        assert!(reg.reserve(&t.id, "fix").await.unwrap().allowed);

        store.set_fail_appends(true);
        let err = reg
            .record_usage(&t.id, "fix", serde_json::json!({"page": "/"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SeofixError::Storage(_)), "{err}");
        assert_eq!(
            reg.resolve(&t.id).await.unwrap().features.fixes_per_month,
            Quota::Limited(1)
        );
        assert!(reg.usage(&t.id).await.unwrap().is_empty());
        // still held until the caller releases it
        assert!(!reg.check_access(&t.id, "fix").await.unwrap().allowed);

        store.set_fail_appends(false);
        reg.record_usage(&t.id, "fix", serde_json::json!({"page": "/"}))
            .await
            .unwrap();
        assert_eq!(
            reg.resolve(&t.id).await.unwrap().features.fixes_per_month,
            Quota::Limited(0)
        );
        assert_eq!(reg.usage(&t.id).await.unwrap().len(), 1);
    }
}
