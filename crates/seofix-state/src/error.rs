//! Error types for seofix-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by [`crate::storage_traits::TenantStore`] operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No tenant stored under this id
    #[error("tenant not found: {tenant_id}")]
    TenantNotFound { tenant_id: String },

    /// Digest string is not 64 hex characters
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// Quota value outside `-1..=u32::MAX`
    #[error("invalid quota value {value}: expected -1 (unlimited) or a non-negative count")]
    InvalidQuota { value: i64 },

    /// Stored document could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_not_found_mentions_id() {
        let err = StorageError::TenantNotFound {
            tenant_id: "tenant_abc".to_string(),
        };
        assert!(err.to_string().contains("tenant_abc"));
    }

    #[test]
    fn test_invalid_quota_mentions_value() {
        let err = StorageError::InvalidQuota { value: -7 };
        assert!(err.to_string().contains("-7"));
    }
}
