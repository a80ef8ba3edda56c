//! SurrealDB-backed TenantStore implementation
//!
//! Uses `schema::TenantRow` and `schema::UsageRow` for persistence,
//! converting to/from the record types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{TenantConfig, TenantId, TenantRow, UsageRecord, UsageRow};
use crate::storage_traits::{StorageResult, TenantStore};

const NAMESPACE: &str = "seofix";
const DATABASE: &str = "main";

/// SurrealDB-backed implementation of [`TenantStore`].
pub struct SurrealTenantStore {
    db: Surreal<Any>,
}

impl SurrealTenantStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Connect to `url` (`mem://`, `surrealkv://path`, `ws://host:port`),
    /// select `seofix/main`, and run `init_schema`.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        if let Some(path) = url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(path).map_err(|e| {
                StateError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealTenantStore connected ({})", url);
        Ok(Self { db })
    }

    /// Connect using `SURREALDB_URL`, defaulting to local persistence in `.seofix/db`.
    pub async fn from_env() -> crate::Result<Self> {
        let url = std::env::var("SURREALDB_URL")
            .unwrap_or_else(|_| "surrealkv://.seofix/db".to_string());
        Self::connect(&url).await
    }
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[async_trait]
impl TenantStore for SurrealTenantStore {
    async fn get_tenant(&self, tenant_id: &TenantId) -> StorageResult<TenantConfig> {
        let tid = tenant_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM tenants WHERE tenant_id = $tid LIMIT 1")
            .bind(("tid", tid))
            .await
            .map_err(backend)?;

        let rows: Vec<TenantRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::TenantNotFound {
                tenant_id: tenant_id.0.clone(),
            })?
            .into_config()
    }

    async fn put_tenant(&self, config: &TenantConfig) -> StorageResult<()> {
        let row = TenantRow::from_config(config)?;
        let tid = config.id.0.clone();

        debug!(tenant_id = %config.id, "upserting tenant");

        self.db
            .query("UPSERT type::thing('tenants', $tid) CONTENT $row")
            .bind(("tid", tid))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        Ok(())
    }

    async fn list_tenants(&self) -> StorageResult<Vec<TenantConfig>> {
        let mut res = self
            .db
            .query("SELECT * FROM tenants ORDER BY tenant_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<TenantRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(TenantRow::into_config).collect()
    }

    async fn append_usage(&self, record: &UsageRecord) -> StorageResult<()> {
        let row = UsageRow::from(record);

        debug!(tenant_id = %record.tenant_id, operation = %record.operation, "appending usage");

        let _created: Option<UsageRow> = self
            .db
            .create("usage_records")
            .content(row)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn usage_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<UsageRecord>> {
        let tid = tenant_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM usage_records WHERE tenant_id = $tid ORDER BY recorded_at ASC")
            .bind(("tid", tid))
            .await
            .map_err(backend)?;

        let rows: Vec<UsageRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(UsageRecord::from).collect())
    }
}
