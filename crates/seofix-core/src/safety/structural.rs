//! Structural integrity: can scripted edits address this page at all?

use async_trait::async_trait;

use super::{SafetyCheck, SafetyResult, SafetyValidationResult, SafetyValidator};
use crate::cms::html::{self, tokenize};
use crate::cms::ContentSink;
use crate::domain::IssueType;

pub const NAME: &str = "structural_integrity";

/// Elements whose end tag HTML lets authors omit.
const OPTIONAL_END: &[&str] = &[
    "html", "head", "body", "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th",
    "thead", "tbody", "tfoot", "colgroup", "caption", "rt", "rp",
];

/// Page-builder fingerprints. Builder pages are generated from a separate
/// layout store, so edits to the rendered markup don't survive.
const BUILDER_MARKERS: &[(&str, &str)] = &[
    ("elementor-", "Elementor"),
    ("et_pb_", "Divi"),
    ("vc_row", "WPBakery"),
    ("wpb_wrapper", "WPBakery"),
    ("fl-builder", "Beaver Builder"),
    ("ct-section", "Oxygen"),
    ("oxy-", "Oxygen"),
];

/// Tag balance problems found in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupReport {
    pub has_root: bool,
    /// Start tags never closed, ignoring optional-end elements.
    pub unclosed: Vec<String>,
    /// End tags with no matching start tag.
    pub stray_closers: Vec<String>,
}

impl MarkupReport {
    pub fn is_balanced(&self) -> bool {
        self.unclosed.is_empty() && self.stray_closers.is_empty()
    }
}

/// Scan a document for a root element and tag balance.
pub fn inspect_markup(doc: &str) -> MarkupReport {
    let mut report = MarkupReport::default();
    let mut stack: Vec<String> = Vec::new();

    for token in tokenize(doc) {
        if token.name == "html" || token.name == "body" {
            report.has_root = true;
        }
        if html::is_void(&token.name) {
            continue;
        }
        if !token.closing {
            if !token.self_closing {
                stack.push(token.name);
            }
            continue;
        }
        match stack.iter().rposition(|open| *open == token.name) {
            Some(idx) => {
                for skipped in stack.drain(idx..).skip(1) {
                    if !OPTIONAL_END.contains(&skipped.as_str()) {
                        report.unclosed.push(skipped);
                    }
                }
            }
            None => report.stray_closers.push(token.name),
        }
    }
    report.unclosed.extend(
        stack
            .into_iter()
            .filter(|open| !OPTIONAL_END.contains(&open.as_str())),
    );
    report
}

/// Name of the page builder that produced `doc`, if any.
pub fn detect_builder(doc: &str) -> Option<&'static str> {
    let lower = doc.to_ascii_lowercase();
    BUILDER_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, builder)| *builder)
}

/// Structural checks for a document, shared with post-change validation.
pub fn structural_checks(doc: &str) -> Vec<SafetyCheck> {
    let report = inspect_markup(doc);
    let mut checks = Vec::with_capacity(3);

    checks.push(if report.has_root {
        SafetyCheck::pass("document_root", "found <html> or <body>")
    } else {
        SafetyCheck::fail("document_root", "no <html> or <body> element")
    });

    checks.push(if report.is_balanced() {
        SafetyCheck::pass("balanced_tags", "all non-void tags closed")
    } else {
        let mut problems: Vec<String> = report
            .unclosed
            .iter()
            .map(|t| format!("unclosed <{t}>"))
            .collect();
        problems.extend(report.stray_closers.iter().map(|t| format!("stray </{t}>")));
        problems.truncate(5);
        SafetyCheck::fail("balanced_tags", problems.join(", "))
    });

    checks.push(match detect_builder(doc) {
        Some(builder) => SafetyCheck::fail(
            "page_builder",
            format!("page is rendered by {builder}; edits would not persist"),
        ),
        None => SafetyCheck::pass("page_builder", "no page builder detected"),
    });

    checks
}

/// Rejects pages that scripted edits cannot safely target.
#[derive(Debug, Default, Clone)]
pub struct StructuralIntegrityValidator;

#[async_trait]
impl SafetyValidator for StructuralIntegrityValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(
        &self,
        cms: &dyn ContentSink,
        page_url: &str,
        _issue_type: IssueType,
    ) -> SafetyResult<SafetyValidationResult> {
        let page = cms.read_page(page_url).await?;
        let checks = structural_checks(&page.html);
        let confidence = if checks.iter().all(|c| c.passed) { 0.95 } else { 0.1 };
        Ok(SafetyValidationResult::from_checks(NAME, checks, confidence))
    }
}
