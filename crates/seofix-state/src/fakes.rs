//! In-memory fakes for storage traits (testing and dry runs)
//!
//! `MemoryTenantStore` satisfies the `TenantStore` contract without any
//! external dependencies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{TenantConfig, TenantId, UsageRecord};
use crate::storage_traits::{StorageResult, TenantStore};

/// In-memory tenant store backed by a `BTreeMap<tenant_id, config>` and a `Vec` ledger.
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    tenants: Mutex<BTreeMap<String, TenantConfig>>,
    usage: Mutex<Vec<UsageRecord>>,
    fail_appends: AtomicBool,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-built tenants.
    pub fn with_tenants(tenants: impl IntoIterator<Item = TenantConfig>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.tenants.lock() {
            for t in tenants {
                map.insert(t.id.0.clone(), t);
            }
        }
        store
    }

    /// Make every later `append_usage` fail, as a ledger outage would.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn get_tenant(&self, tenant_id: &TenantId) -> StorageResult<TenantConfig> {
        let tenants = self.tenants.lock().map_err(|_| Self::poisoned())?;
        tenants
            .get(&tenant_id.0)
            .cloned()
            .ok_or_else(|| StorageError::TenantNotFound {
                tenant_id: tenant_id.0.clone(),
            })
    }

    async fn put_tenant(&self, config: &TenantConfig) -> StorageResult<()> {
        let mut tenants = self.tenants.lock().map_err(|_| Self::poisoned())?;
        tenants.insert(config.id.0.clone(), config.clone());
        Ok(())
    }

    async fn list_tenants(&self) -> StorageResult<Vec<TenantConfig>> {
        let tenants = self.tenants.lock().map_err(|_| Self::poisoned())?;
        Ok(tenants.values().cloned().collect())
    }

    async fn append_usage(&self, record: &UsageRecord) -> StorageResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("usage ledger unavailable".to_string()));
        }
        let mut usage = self.usage.lock().map_err(|_| Self::poisoned())?;
        usage.push(record.clone());
        Ok(())
    }

    async fn usage_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<UsageRecord>> {
        let usage = self.usage.lock().map_err(|_| Self::poisoned())?;
        Ok(usage
            .iter()
            .filter(|r| &r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
