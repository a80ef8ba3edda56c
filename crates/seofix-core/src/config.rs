//! Runtime configuration for the fix pipeline.
//!
//! Values come from built-in defaults, an optional TOML file, and `SEOFIX_*`
//! environment variables, applied in that order.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Result, SeofixError};

/// Which fix attempts are billed against the tenant's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePolicy {
    /// Every attempt that passed the access check is billed.
    #[default]
    EveryAttempt,
    /// Only committed fixes are billed.
    SuccessOnly,
}

impl FromStr for UsagePolicy {
    type Err = SeofixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "every_attempt" => Ok(Self::EveryAttempt),
            "success_only" => Ok(Self::SuccessOnly),
            other => Err(SeofixError::Config(format!("unknown usage policy '{other}'"))),
        }
    }
}

/// Tunables for validators, strategies and collaborator timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeofixConfig {
    /// Upper bound on a single safety validator.
    pub validator_timeout_ms: u64,
    /// Upper bound on a single CMS read, write or revert.
    pub cms_timeout_ms: u64,
    /// Upper bound on a single content generator call.
    pub generator_timeout_ms: u64,
    pub usage_policy: UsagePolicy,
    /// Maximum page weight after a fix.
    pub page_weight_budget_bytes: u64,
    /// Pages with fewer body words than this are thin.
    pub thin_content_min_words: usize,
    pub meta_description_max_chars: usize,
}

impl Default for SeofixConfig {
    fn default() -> Self {
        Self {
            validator_timeout_ms: 5_000,
            cms_timeout_ms: 10_000,
            generator_timeout_ms: 30_000,
            usage_policy: UsagePolicy::EveryAttempt,
            page_weight_budget_bytes: 512 * 1024,
            thin_content_min_words: 300,
            meta_description_max_chars: 160,
        }
    }
}

impl SeofixConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Overlay `SEOFIX_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup; split out so tests don't touch
    /// the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SEOFIX_VALIDATOR_TIMEOUT_MS") {
            self.validator_timeout_ms = parse_var("SEOFIX_VALIDATOR_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SEOFIX_CMS_TIMEOUT_MS") {
            self.cms_timeout_ms = parse_var("SEOFIX_CMS_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SEOFIX_GENERATOR_TIMEOUT_MS") {
            self.generator_timeout_ms = parse_var("SEOFIX_GENERATOR_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SEOFIX_USAGE_POLICY") {
            self.usage_policy = v.parse()?;
        }
        if let Some(v) = lookup("SEOFIX_PAGE_WEIGHT_BUDGET_BYTES") {
            self.page_weight_budget_bytes = parse_var("SEOFIX_PAGE_WEIGHT_BUDGET_BYTES", &v)?;
        }
        if let Some(v) = lookup("SEOFIX_THIN_CONTENT_MIN_WORDS") {
            self.thin_content_min_words = parse_var("SEOFIX_THIN_CONTENT_MIN_WORDS", &v)?;
        }
        if let Some(v) = lookup("SEOFIX_META_DESCRIPTION_MAX_CHARS") {
            self.meta_description_max_chars = parse_var("SEOFIX_META_DESCRIPTION_MAX_CHARS", &v)?;
        }
        self.validated()
    }

    fn validated(self) -> Result<Self> {
        for (name, value) in [
            ("validator_timeout_ms", self.validator_timeout_ms),
            ("cms_timeout_ms", self.cms_timeout_ms),
            ("generator_timeout_ms", self.generator_timeout_ms),
        ] {
            if value == 0 {
                return Err(SeofixError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.meta_description_max_chars == 0 {
            return Err(SeofixError::Config(
                "meta_description_max_chars must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn validator_timeout(&self) -> Duration {
        Duration::from_millis(self.validator_timeout_ms)
    }

    pub fn cms_timeout(&self) -> Duration {
        Duration::from_millis(self.cms_timeout_ms)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SeofixError::Config(format!("{key}: cannot parse '{value}'")))
}
