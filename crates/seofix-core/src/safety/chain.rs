//! Concurrent, fail-closed safety validator chain.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;

use seofix_state::TenantId;

use super::business::BusinessImpactValidator;
use super::performance::PerformanceImpactValidator;
use super::structural::StructuralIntegrityValidator;
use super::{aggregate, SafetyError, SafetyReport, SafetyValidationResult, SafetyValidator};
use crate::cms::ContentSink;
use crate::config::SeofixConfig;
use crate::domain::IssueType;
use crate::obs;

/// Runs every registered validator concurrently, each under its own timeout,
/// and reduces their verdicts in registration order.
pub struct SafetyValidatorChain {
    validators: Vec<Arc<dyn SafetyValidator>>,
    timeout: Duration,
}

impl SafetyValidatorChain {
    /// An empty chain. Empty chains always report unsafe.
    pub fn new(timeout: Duration) -> Self {
        Self {
            validators: Vec::new(),
            timeout,
        }
    }

    /// Structural, business and performance validators, in that order.
    pub fn standard(config: &SeofixConfig) -> Self {
        Self::new(config.validator_timeout())
            .with_validator(Arc::new(StructuralIntegrityValidator))
            .with_validator(Arc::new(BusinessImpactValidator))
            .with_validator(Arc::new(PerformanceImpactValidator::new(
                config.page_weight_budget_bytes,
            )))
    }

    pub fn with_validator(mut self, validator: Arc<dyn SafetyValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validator_names(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.name().to_string()).collect()
    }

    /// Validate `page_url` for a fix of `issue_type`.
    ///
    /// Never fails: a validator that errors, panics or times out is recorded
    /// as unsafe with zero confidence.
    pub async fn run(
        &self,
        tenant_id: &TenantId,
        cms: Arc<dyn ContentSink>,
        page_url: &str,
        issue_type: IssueType,
    ) -> SafetyReport {
        let mut join_set = JoinSet::new();
        for (idx, validator) in self.validators.iter().enumerate() {
            let validator = Arc::clone(validator);
            let cms = Arc::clone(&cms);
            let url = page_url.to_string();
            let timeout = self.timeout;
            join_set.spawn(async move {
                let name = validator.name().to_string();
                let guarded = AssertUnwindSafe(validator.validate(cms.as_ref(), &url, issue_type))
                    .catch_unwind();
                let outcome = match tokio::time::timeout(timeout, guarded).await {
                    Ok(Ok(Ok(result))) => Ok(result),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(panic)) => Err(SafetyError::Panicked(panic_message(panic.as_ref()))),
                    Err(_) => Err(SafetyError::Timeout(timeout)),
                };
                let verdict = outcome.unwrap_or_else(|e| {
                    obs::emit_validator_failed(&name, &e);
                    SafetyValidationResult::failed(&name, &e)
                });
                (idx, verdict)
            });
        }

        let mut slots: Vec<Option<SafetyValidationResult>> = vec![None; self.validators.len()];
        while let Some(joined) = join_set.join_next().await {
            // The task body cannot panic; a join error means the runtime cancelled it.
            if let Ok((idx, verdict)) = joined {
                slots[idx] = Some(verdict);
            }
        }

        let results: Vec<SafetyValidationResult> = slots
            .into_iter()
            .zip(&self.validators)
            .map(|(slot, validator)| {
                slot.unwrap_or_else(|| {
                    let e = SafetyError::Panicked("validator task did not complete".to_string());
                    SafetyValidationResult::failed(validator.name(), &e)
                })
            })
            .collect();

        let report = aggregate(tenant_id, page_url, issue_type, results);
        obs::emit_safety_evaluated(page_url, report.is_safe, report.confidence, report.results.len());
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
