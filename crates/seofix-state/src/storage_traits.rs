//! Storage trait definitions for SEOFIX
//!
//! - `ContentDigest`: SHA-256 identity of a page snapshot
//! - `TenantStore`: tenant documents plus the append-only usage ledger
//!
//! All traits are async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;
use crate::schema::{TenantConfig, TenantId, UsageRecord};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TenantStore
// ---------------------------------------------------------------------------

/// Durable key-value persistence for tenants and usage.
///
/// Guarantees:
/// - `put_tenant` replaces the whole document for `config.id`.
/// - `append_usage` returns only after the record is durably written;
///   records are never updated or removed.
/// - `usage_for` returns a tenant's records oldest first.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fetch a tenant document. Returns `StorageError::TenantNotFound` if absent.
    async fn get_tenant(&self, tenant_id: &TenantId) -> StorageResult<TenantConfig>;

    /// Insert or replace a tenant document.
    async fn put_tenant(&self, config: &TenantConfig) -> StorageResult<()>;

    /// All tenants, ordered by id.
    async fn list_tenants(&self) -> StorageResult<Vec<TenantConfig>>;

    /// Append one usage record to the ledger.
    async fn append_usage(&self, record: &UsageRecord) -> StorageResult<()>;

    /// Usage records for a tenant, oldest first.
    async fn usage_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<UsageRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_short() {
        let a = ContentDigest::from_bytes(b"<html></html>");
        let b = ContentDigest::from_bytes(b"<html></html>");
        assert_eq!(a, b);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_digest_try_from_validates() {
        assert!(ContentDigest::try_from("abc".to_string()).is_err());
        let good = ContentDigest::from_bytes(b"x").as_str().to_uppercase();
        let parsed = ContentDigest::try_from(good).unwrap();
        assert_eq!(parsed, ContentDigest::from_bytes(b"x"));
    }
}
