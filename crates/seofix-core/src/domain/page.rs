//! Page snapshots, change sets and the audit record of applied changes.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use seofix_state::ContentDigest;

use crate::text::{collapse_whitespace, strip_tags, unescape_html};

/// Pre- or post-change state of one CMS page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// CMS-specific page identifier used for writes and reverts.
    pub page_id: String,
    pub url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

impl PageSnapshot {
    pub fn new(page_id: impl Into<String>, url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            url: url.into(),
            html: html.into(),
            fetched_at: Utc::now(),
        }
    }

    /// SHA-256 of the page markup; equal digests mean bit-for-bit equal pages.
    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_bytes(self.html.as_bytes())
    }

    pub fn byte_len(&self) -> usize {
        self.html.len()
    }
}

/// What a change does to the selected element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Append `content` as the last child of the element.
    Add,
    /// Replace the element's outer markup with `content`.
    Update,
    /// Delete the element.
    Remove,
}

/// A precondition on a change's payload, checked before it reaches the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum ValidationRule {
    NotEmpty,
    MaxLength(usize),
    MinLength(usize),
    MustContain(String),
}

impl ValidationRule {
    /// Check the rule against the visible text of a payload.
    pub fn check(&self, text: &str) -> Result<(), String> {
        let len = text.chars().count();
        match self {
            Self::NotEmpty if text.trim().is_empty() => Err("payload is empty".to_string()),
            Self::MaxLength(max) if len > *max => {
                Err(format!("payload is {len} chars, limit is {max}"))
            }
            Self::MinLength(min) if len < *min => {
                Err(format!("payload is {len} chars, minimum is {min}"))
            }
            Self::MustContain(needle) if !text.contains(needle.as_str()) => {
                Err(format!("payload does not contain '{needle}'"))
            }
            _ => Ok(()),
        }
    }
}

/// One concrete, reviewable edit to one element of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Element selector: `tag`, `tag[attr="value"]` or `tag:nth-of-type(n)`.
    pub selector: String,
    pub action: ChangeAction,
    /// Markup to insert or replace with; empty for removals.
    pub content: String,
    pub validation_rules: Vec<ValidationRule>,
}

fn meta_content_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)^\s*<meta\b[^>]*\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

impl ChangeSet {
    pub fn new(selector: impl Into<String>, action: ChangeAction, content: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            action,
            content: content.into(),
            validation_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    /// Visible text of the payload: a meta tag's `content` attribute, or the
    /// markup with tags stripped. Entities are decoded so length rules count
    /// what a reader sees.
    pub fn payload_text(&self) -> String {
        if let Some(caps) = meta_content_re().captures(&self.content) {
            let raw = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            return collapse_whitespace(&unescape_html(raw));
        }
        collapse_whitespace(&unescape_html(&strip_tags(&self.content)))
    }

    /// Run every validation rule, returning the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let text = self.payload_text();
        for rule in &self.validation_rules {
            rule.check(&text)
                .map_err(|reason| format!("{} on {}: {}", rule_name(rule), self.selector, reason))?;
        }
        Ok(())
    }
}

fn rule_name(rule: &ValidationRule) -> &'static str {
    match rule {
        ValidationRule::NotEmpty => "not_empty",
        ValidationRule::MaxLength(_) => "max_length",
        ValidationRule::MinLength(_) => "min_length",
        ValidationRule::MustContain(_) => "must_contain",
    }
}

/// Audit record of one concrete mutation. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub element: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub timestamp: DateTime<Utc>,
}
