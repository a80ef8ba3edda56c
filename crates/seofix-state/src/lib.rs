//! SEOFIX-State: tenant and usage persistence
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: durable usage writes (billing correctness) and a replaceable
//! key-value home for tenant configuration.
//!
//! ## Key Components
//!
//! - `TenantStore`: backend-agnostic async trait
//! - `MemoryTenantStore`: in-memory fake for tests and dry runs
//! - `SurrealTenantStore`: SurrealDB backend (`mem://`, `surrealkv://`, remote)

mod error;
pub mod fakes;
mod migrations;
pub mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use schema::{
    CmsCredentials, Features, PlanTier, Quota, TenantConfig, TenantId, TenantStatus, UsageRecord,
};
pub use storage_traits::{ContentDigest, StorageResult, TenantStore};
pub use surreal_store::SurrealTenantStore;

/// Result type for seofix-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
