//! SurrealDB schema initialization for the tenant and usage tables.
//!
//! Safe to call multiple times (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all SEOFIX tables.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing SEOFIX SurrealDB schema");

    init_tenants_table(db).await?;
    init_usage_records_table(db).await?;

    info!("SEOFIX schema initialization complete");
    Ok(())
}

/// Initialize `tenants` table
///
/// Schema:
/// ```text
/// TABLE tenants {
///   tenant_id:   STRING (unique, also the record key)
///   document:    OBJECT (serialized TenantConfig)
///   updated_at:  DATETIME
/// }
/// ```
async fn init_tenants_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tenants table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS tenants SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_tenant_id ON TABLE tenants COLUMNS tenant_id UNIQUE;
    "#;

    db.query(sql)
        .await?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `usage_records` table
///
/// Schema:
/// ```text
/// TABLE usage_records {
///   usage_id:     STRING (unique)
///   tenant_id:    STRING (indexed)
///   operation:    STRING
///   cost:         FLOAT
///   details:      OBJECT
///   recorded_at:  DATETIME
/// }
/// ```
///
/// Rows are append-only: updates and deletes are not permitted.
async fn init_usage_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing usage_records table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS usage_records SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_usage_id ON TABLE usage_records COLUMNS usage_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_usage_tenant ON TABLE usage_records COLUMNS tenant_id, recorded_at;
    "#;

    db.query(sql)
        .await?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}
