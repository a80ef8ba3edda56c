//! Business impact: revenue, account and legal pages are never auto-edited.

use async_trait::async_trait;

use super::{SafetyCheck, SafetyResult, SafetyValidationResult, SafetyValidator};
use crate::cms::{html, page_path, ContentSink};
use crate::domain::IssueType;

pub const NAME: &str = "business_impact";

/// URL path segments that mark a protected page, with the category reported.
const PROTECTED_SEGMENTS: &[(&str, &str)] = &[
    ("checkout", "checkout"),
    ("cart", "cart"),
    ("basket", "cart"),
    ("payment", "payment"),
    ("payments", "payment"),
    ("pay", "payment"),
    ("pricing", "pricing"),
    ("prices", "pricing"),
    ("plans", "pricing"),
    ("billing", "billing"),
    ("invoice", "billing"),
    ("invoices", "billing"),
    ("account", "account"),
    ("my-account", "account"),
    ("login", "login"),
    ("signin", "login"),
    ("sign-in", "login"),
    ("logout", "login"),
    ("register", "login"),
    ("signup", "login"),
    ("legal", "legal"),
    ("terms", "legal"),
    ("terms-of-service", "legal"),
    ("privacy", "legal"),
    ("privacy-policy", "legal"),
    ("cookie-policy", "legal"),
    ("imprint", "legal"),
    ("impressum", "legal"),
];

/// In-page markers of transactional or credential forms.
const PROTECTED_MARKERS: &[(&str, &str)] = &[
    ("woocommerce-checkout", "checkout"),
    ("woocommerce-cart-form", "cart"),
    ("autocomplete=\"cc-", "payment"),
    ("data-stripe", "payment"),
    ("paypal-button", "payment"),
    ("type=\"password\"", "login"),
];

/// Category of protected page the URL path points at, if any.
pub fn protected_path(page_url: &str) -> Option<&'static str> {
    let path = page_path(page_url).to_ascii_lowercase();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches(".html").trim_end_matches(".htm"))
        .find_map(|segment| {
            PROTECTED_SEGMENTS
                .iter()
                .find(|(name, _)| *name == segment)
                .map(|(_, category)| *category)
        })
}

/// Category of protected content found in the page, if any.
pub fn protected_content(doc: &str) -> Option<&'static str> {
    let lower = doc.to_ascii_lowercase();
    PROTECTED_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, category)| *category)
}

/// Blocks edits to checkout, payment, pricing, account and legal pages.
#[derive(Debug, Default, Clone)]
pub struct BusinessImpactValidator;

#[async_trait]
impl SafetyValidator for BusinessImpactValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(
        &self,
        cms: &dyn ContentSink,
        page_url: &str,
        _issue_type: IssueType,
    ) -> SafetyResult<SafetyValidationResult> {
        let mut checks = Vec::with_capacity(3);

        checks.push(match protected_path(page_url) {
            Some(category) => SafetyCheck::fail(
                "protected_path",
                format!("{category} pages are never edited automatically"),
            ),
            None => SafetyCheck::pass("protected_path", "path is not a protected page"),
        });

        let page = cms.read_page(page_url).await?;
        checks.push(match protected_content(&page.html) {
            Some(category) => SafetyCheck::fail(
                "protected_content",
                format!("page contains {category} markup"),
            ),
            None => SafetyCheck::pass("protected_content", "no transactional markup"),
        });

        let forms = html::find_elements(&page.html, "form").len();
        checks.push(SafetyCheck::pass(
            "forms",
            format!("{forms} form(s) on page"),
        ));

        let confidence = match (checks.iter().all(|c| c.passed), forms) {
            (false, _) => 0.1,
            (true, 0) => 0.9,
            (true, _) => 0.75,
        };
        Ok(SafetyValidationResult::from_checks(NAME, checks, confidence))
    }
}
