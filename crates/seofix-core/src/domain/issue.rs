//! The closed set of SEO issue categories that have an automated fix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SeofixError;

/// Issue category reported by the audit and consumed by the fix pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingMetaDescription,
    ThinContent,
    MissingInternalLinks,
    HeadingStructure,
}

impl IssueType {
    pub const ALL: [IssueType; 4] = [
        Self::MissingMetaDescription,
        Self::ThinContent,
        Self::MissingInternalLinks,
        Self::HeadingStructure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingMetaDescription => "missing_meta_description",
            Self::ThinContent => "thin_content",
            Self::MissingInternalLinks => "missing_internal_links",
            Self::HeadingStructure => "heading_structure",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = SeofixError;

    /// Accepts the canonical names plus the aliases the audit report uses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "missing_meta_description" | "meta_description" => Ok(Self::MissingMetaDescription),
            "thin_content" | "low_word_count" => Ok(Self::ThinContent),
            "missing_internal_links" | "internal_links" | "internal_linking" => {
                Ok(Self::MissingInternalLinks)
            }
            "heading_structure" | "missing_h1" | "multiple_h1" => Ok(Self::HeadingStructure),
            _ => Err(SeofixError::UnknownIssueType(s.to_string())),
        }
    }
}
