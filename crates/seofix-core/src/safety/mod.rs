//! Safety validation for automated page edits.
//!
//! Independent validators inspect the live page and vote. The chain runs them
//! concurrently and reduces their votes fail-closed: one unsafe vote, error,
//! panic or timeout blocks the fix.

pub mod business;
pub mod chain;
pub mod performance;
pub mod structural;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use seofix_state::TenantId;

use crate::cms::{CmsError, ContentSink};
use crate::domain::IssueType;

pub use business::BusinessImpactValidator;
pub use chain::SafetyValidatorChain;
pub use performance::PerformanceImpactValidator;
pub use structural::StructuralIntegrityValidator;

/// Errors a validator may raise instead of voting.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("cms error: {0}")]
    Cms(#[from] CmsError),

    #[error("validator timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("validator panicked: {0}")]
    Panicked(String),
}

pub type SafetyResult<T> = std::result::Result<T, SafetyError>;

/// One named criterion inside a validator's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl SafetyCheck {
    pub fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// One validator's verdict on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyValidationResult {
    /// Set by the chain; a validator on its own has no tenant context.
    pub tenant_id: Option<TenantId>,
    pub validator: String,
    pub is_safe: bool,
    /// Confidence that the edit is safe, in `[0, 1]`.
    pub confidence: f64,
    pub reason: Option<String>,
    pub checks: Vec<SafetyCheck>,
}

impl SafetyValidationResult {
    /// Build a verdict from checks: safe iff every check passed. The reason is
    /// the first failed check's detail.
    pub fn from_checks(validator: &str, checks: Vec<SafetyCheck>, confidence: f64) -> Self {
        let reason = checks
            .iter()
            .find(|c| !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail));
        Self {
            tenant_id: None,
            validator: validator.to_string(),
            is_safe: reason.is_none(),
            confidence: clamp_confidence(confidence),
            reason,
            checks,
        }
    }

    /// Verdict recorded for a validator that errored, panicked or timed out.
    pub fn failed(validator: &str, error: &SafetyError) -> Self {
        Self {
            tenant_id: None,
            validator: validator.to_string(),
            is_safe: false,
            confidence: 0.0,
            reason: Some(format!("{validator} failed: {error}")),
            checks: vec![SafetyCheck::fail("validator_completed", error.to_string())],
        }
    }
}

/// Confidence in `[0, 1]`; NaN and infinities count as no confidence.
fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Combined verdict of every validator in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub tenant_id: TenantId,
    pub page_url: String,
    pub issue_type: IssueType,
    pub is_safe: bool,
    pub confidence: f64,
    pub reason: Option<String>,
    pub checks: Vec<SafetyCheck>,
    /// Per-validator verdicts in registration order.
    pub results: Vec<SafetyValidationResult>,
}

/// Reduce per-validator verdicts, given in registration order.
///
/// Safe iff there is at least one verdict and all are safe. Confidence is the
/// minimum. The reason is the first unsafe verdict's. Checks are concatenated.
pub fn aggregate(
    tenant_id: &TenantId,
    page_url: &str,
    issue_type: IssueType,
    mut results: Vec<SafetyValidationResult>,
) -> SafetyReport {
    for r in &mut results {
        r.tenant_id = Some(tenant_id.clone());
    }
    let is_safe = !results.is_empty() && results.iter().all(|r| r.is_safe);
    let confidence = results
        .iter()
        .map(|r| clamp_confidence(r.confidence))
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))
        .unwrap_or(0.0);
    let reason = if results.is_empty() {
        Some("no safety validators configured".to_string())
    } else {
        results.iter().find(|r| !r.is_safe).map(|r| {
            r.reason
                .clone()
                .unwrap_or_else(|| format!("{} reported unsafe", r.validator))
        })
    };
    let checks = results.iter().flat_map(|r| r.checks.iter().cloned()).collect();
    SafetyReport {
        tenant_id: tenant_id.clone(),
        page_url: page_url.to_string(),
        issue_type,
        is_safe,
        confidence,
        reason,
        checks,
        results,
    }
}

/// One independent safety criterion over a live page.
#[async_trait]
pub trait SafetyValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect the live page. Never cached: each call reads through `cms`.
    async fn validate(
        &self,
        cms: &dyn ContentSink,
        page_url: &str,
        issue_type: IssueType,
    ) -> SafetyResult<SafetyValidationResult>;
}
