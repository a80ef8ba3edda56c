//! Tenant registry: plan tiers, access decisions, quota reservations and the
//! usage ledger.

pub mod plans;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

use seofix_state::Quota;

pub use plans::{features_for, unit_price};
pub use registry::{TenantRegistration, TenantRegistry};

/// A metered operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Audit,
    Fix,
    CompetitorAnalysis,
    ContentGeneration,
    /// Anything else. Never granted, priced at zero.
    Other(String),
}

impl Operation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "audit" => Self::Audit,
            "fix" => Self::Fix,
            "competitor_analysis" => Self::CompetitorAnalysis,
            "content_generation" => Self::ContentGeneration,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Audit => "audit",
            Self::Fix => "fix",
            Self::CompetitorAnalysis => "competitor_analysis",
            Self::ContentGeneration => "content_generation",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Operation {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    /// Why access was denied; `None` when allowed.
    pub reason: Option<String>,
    /// Units left for quota-metered operations, net of held reservations.
    pub remaining_quota: Option<Quota>,
}

impl AccessDecision {
    pub fn allow(remaining_quota: Option<Quota>) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining_quota,
        }
    }

    pub fn deny(reason: impl Into<String>, remaining_quota: Option<Quota>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining_quota,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parse() {
        assert_eq!(Operation::parse("FIX"), Operation::Fix);
        assert_eq!(Operation::parse("competitor_analysis"), Operation::CompetitorAnalysis);
        assert_eq!(Operation::parse("launch"), Operation::Other("launch".into()));
        assert_eq!(Operation::Other("launch".into()).to_string(), "launch");
    }
}
