//! Performance impact: the fix must not push the page past its weight budget.

use async_trait::async_trait;

use super::{SafetyCheck, SafetyResult, SafetyValidationResult, SafetyValidator};
use crate::cms::{html, ContentSink};
use crate::domain::IssueType;
use crate::strategy::FixStrategy;

pub const NAME: &str = "performance_impact";

/// Most bytes a fix for `issue` can add. Strategies reject plans that grow a
/// page by more than this, so the estimate is an upper bound.
pub fn estimated_growth(issue: IssueType) -> u64 {
    FixStrategy::for_issue(issue).max_growth() as u64
}

/// Whether a page of `weight` bytes fits `budget_bytes`.
pub fn weight_check(weight: u64, budget_bytes: u64) -> SafetyCheck {
    if weight <= budget_bytes {
        SafetyCheck::pass("page_weight", format!("{weight} of {budget_bytes} bytes"))
    } else {
        SafetyCheck::fail(
            "page_weight",
            format!("{weight} bytes exceeds the {budget_bytes} byte budget"),
        )
    }
}

/// Bytes of inline `<script>` and `<style>` bodies.
pub fn inline_weight(doc: &str) -> u64 {
    let scripts = html::find_elements(doc, "script")
        .into_iter()
        .filter(|e| e.attr("src").is_none());
    let styles = html::find_elements(doc, "style").into_iter();
    scripts
        .chain(styles)
        .map(|e| (e.inner_end - e.open_end) as u64)
        .sum()
}

/// Keeps post-fix page weight under a byte budget.
#[derive(Debug, Clone)]
pub struct PerformanceImpactValidator {
    budget_bytes: u64,
}

impl PerformanceImpactValidator {
    pub fn new(budget_bytes: u64) -> Self {
        Self { budget_bytes }
    }
}

#[async_trait]
impl SafetyValidator for PerformanceImpactValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(
        &self,
        cms: &dyn ContentSink,
        page_url: &str,
        issue_type: IssueType,
    ) -> SafetyResult<SafetyValidationResult> {
        let page = cms.read_page(page_url).await?;
        let weight = page.byte_len() as u64;
        let projected = weight + estimated_growth(issue_type);

        let mut checks = Vec::with_capacity(2);
        checks.push(weight_check(projected, self.budget_bytes));

        let inline = inline_weight(&page.html);
        let inline_ratio = if weight == 0 {
            0.0
        } else {
            inline as f64 / weight as f64
        };
        checks.push(SafetyCheck::pass(
            "inline_assets",
            format!("{inline} bytes of inline script/style ({:.0}%)", inline_ratio * 100.0),
        ));

        let mut confidence: f64 = if inline_ratio > 0.5 {
            0.6
        } else if inline_ratio > 0.25 {
            0.8
        } else {
            0.95
        };
        if self.budget_bytes > 0 && projected as f64 > self.budget_bytes as f64 * 0.9 {
            confidence = confidence.min(0.7);
        }
        if !checks.iter().all(|c| c.passed) {
            confidence = 0.1;
        }
        Ok(SafetyValidationResult::from_checks(NAME, checks, confidence))
    }
}
