//! Domain-level error taxonomy for SEOFIX.

use seofix_state::{StorageError, TenantId};

/// SEOFIX domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SeofixError {
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error("unknown issue type: {0}")]
    UnknownIssueType(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SEOFIX domain operations.
pub type Result<T> = std::result::Result<T, SeofixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seofix_error_display() {
        let err = SeofixError::TenantNotFound(TenantId::from("t-missing"));
        assert!(err.to_string().contains("tenant not found"));
        assert!(err.to_string().contains("t-missing"));

        let err = SeofixError::UnknownIssueType("foo_bar".to_string());
        assert!(err.to_string().contains("foo_bar"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: SeofixError = StorageError::Backend("disk full".to_string()).into();
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("disk full"));
    }
}
