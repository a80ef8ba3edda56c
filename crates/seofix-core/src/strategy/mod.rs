//! Fix strategies: one per issue type, each turning a live page into a
//! reviewable `FixPlan`.

pub mod headings;
pub mod internal_links;
pub mod meta_description;
pub mod thin_content;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use seofix_state::ContentDigest;

use crate::cms::{bounded, html, CmsError, ContentSink};
use crate::config::SeofixConfig;
use crate::domain::{AppliedChange, ChangeSet, IssueType, PageSnapshot};
use crate::generator::{ContentGenerator, GeneratorError};
use crate::text;

/// Errors raised while resolving a strategy or building a plan.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("no fix strategy for issue type '{0}'")]
    NotFound(String),

    #[error("cms error: {0}")]
    Cms(#[from] CmsError),

    #[error("content generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("change rule violated: {0}")]
    RuleViolation(String),

    #[error("page has no element to place the fix in: {0}")]
    NoTarget(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

/// Caller-supplied hints that override or steer generated content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customizations {
    pub meta_description: Option<String>,
    pub internal_links: Vec<LinkTarget>,
    /// Subject hint passed to the generator.
    pub topic: Option<String>,
}

/// A page to link to from the page being fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub url: String,
    pub anchor: String,
}

/// Collaborators a strategy may call while planning.
pub struct PlanContext<'a> {
    pub cms: &'a dyn ContentSink,
    pub generator: &'a dyn ContentGenerator,
    pub config: &'a SeofixConfig,
}

impl PlanContext<'_> {
    /// Ask the generator for text, bounded by the generator timeout.
    pub async fn generate(&self, prompt: &str) -> StrategyResult<String> {
        let limit = self.config.generator_timeout();
        match tokio::time::timeout(limit, self.generator.complete(prompt)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GeneratorError::Timeout(limit).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy registry
// ---------------------------------------------------------------------------

/// The closed set of fix strategies, one per `IssueType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategy {
    MetaDescription,
    ThinContent,
    InternalLinks,
    HeadingStructure,
}

impl FixStrategy {
    pub fn for_issue(issue: IssueType) -> Self {
        match issue {
            IssueType::MissingMetaDescription => Self::MetaDescription,
            IssueType::ThinContent => Self::ThinContent,
            IssueType::MissingInternalLinks => Self::InternalLinks,
            IssueType::HeadingStructure => Self::HeadingStructure,
        }
    }

    /// Resolve a raw issue name. Unknown names have no strategy.
    pub fn resolve(raw_issue: &str) -> StrategyResult<Self> {
        raw_issue
            .parse::<IssueType>()
            .map(Self::for_issue)
            .map_err(|_| StrategyError::NotFound(raw_issue.to_string()))
    }

    pub fn issue_type(self) -> IssueType {
        match self {
            Self::MetaDescription => IssueType::MissingMetaDescription,
            Self::ThinContent => IssueType::ThinContent,
            Self::InternalLinks => IssueType::MissingInternalLinks,
            Self::HeadingStructure => IssueType::HeadingStructure,
        }
    }

    /// Most bytes a plan from this strategy may add to a page.
    pub fn max_growth(self) -> usize {
        match self {
            Self::MetaDescription => meta_description::MAX_GROWTH_BYTES,
            Self::ThinContent => thin_content::MAX_GROWTH_BYTES,
            Self::InternalLinks => internal_links::MAX_GROWTH_BYTES,
            Self::HeadingStructure => headings::MAX_GROWTH_BYTES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MetaDescription => "meta_description",
            Self::ThinContent => "thin_content",
            Self::InternalLinks => "internal_links",
            Self::HeadingStructure => "heading_structure",
        }
    }

    /// Read the page and build the plan that fixes it. An empty plan means
    /// the page already satisfies the strategy.
    pub async fn generate_fix_plan(
        self,
        ctx: &PlanContext<'_>,
        page_url: &str,
        customizations: &Customizations,
    ) -> StrategyResult<FixPlan> {
        let page = bounded("read_page", ctx.config.cms_timeout(), ctx.cms.read_page(page_url)).await?;
        let changes = match self {
            Self::MetaDescription => meta_description::plan(ctx, &page, customizations).await?,
            Self::ThinContent => thin_content::plan(ctx, &page, customizations).await?,
            Self::InternalLinks => internal_links::plan(ctx, &page, customizations).await?,
            Self::HeadingStructure => headings::plan(ctx, &page, customizations).await?,
        };
        let plan = FixPlan {
            page_url: page_url.to_string(),
            page_id: page.page_id.clone(),
            issue_type: self.issue_type(),
            strategy: self,
            base_digest: page.digest(),
            changes,
        };
        plan.validate()?;
        let added = plan.projected_growth(&page.html)?;
        if added > self.max_growth() {
            return Err(StrategyError::RuleViolation(format!(
                "plan adds {added} bytes, {} allows at most {}",
                self,
                self.max_growth()
            )));
        }
        Ok(plan)
    }
}

impl fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Ordered changes for one page, bound to the strategy that produced them.
/// `execute` consumes the plan, so a plan runs at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixPlan {
    pub page_url: String,
    pub page_id: String,
    pub issue_type: IssueType,
    pub strategy: FixStrategy,
    /// Digest of the page the plan was computed against.
    pub base_digest: ContentDigest,
    pub changes: Vec<ChangeSet>,
}

/// A plan stopped partway. `applied` lists what reached the CMS first.
#[derive(Debug, thiserror::Error)]
#[error("change {index} on '{selector}' failed: {source}")]
pub struct PlanExecutionError {
    pub index: usize,
    pub selector: String,
    pub applied: Vec<AppliedChange>,
    #[source]
    pub source: StrategyError,
}

impl FixPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Check every change's validation rules.
    pub fn validate(&self) -> StrategyResult<()> {
        for change in &self.changes {
            change.validate().map_err(StrategyError::RuleViolation)?;
        }
        Ok(())
    }

    /// Bytes the plan adds to `doc`, found by applying every change to a copy.
    pub fn projected_growth(&self, doc: &str) -> StrategyResult<usize> {
        let mut projected = doc.to_string();
        for change in &self.changes {
            projected = html::apply_change(&projected, change)?.0;
        }
        Ok(projected.len().saturating_sub(doc.len()))
    }

    /// Send the changes to the CMS in order. Each change's rules are checked
    /// again immediately before it is sent.
    pub async fn execute(
        self,
        cms: &dyn ContentSink,
        timeout: Duration,
    ) -> Result<Vec<AppliedChange>, PlanExecutionError> {
        let mut applied = Vec::with_capacity(self.changes.len());
        for (index, change) in self.changes.into_iter().enumerate() {
            let outcome = match change.validate() {
                Err(reason) => Err(StrategyError::RuleViolation(reason)),
                Ok(()) => bounded("apply_change", timeout, cms.apply_change(&self.page_id, &change))
                    .await
                    .map_err(StrategyError::from),
            };
            match outcome {
                Ok(record) => applied.push(record),
                Err(source) => {
                    return Err(PlanExecutionError {
                        index,
                        selector: change.selector,
                        applied,
                        source,
                    })
                }
            }
        }
        Ok(applied)
    }
}

// ---------------------------------------------------------------------------
// Page helpers shared by strategies
// ---------------------------------------------------------------------------

/// Selector of the element new body content goes into: `main` if present,
/// else `body`.
pub(crate) fn content_container(doc: &str) -> StrategyResult<&'static str> {
    if !html::find_elements(doc, "main").is_empty() {
        Ok("main")
    } else if !html::find_elements(doc, "body").is_empty() {
        Ok("body")
    } else {
        Err(StrategyError::NoTarget("no <main> or <body>".to_string()))
    }
}

/// Text of the page's `<title>`, decoded and collapsed.
pub(crate) fn page_title(doc: &str) -> Option<String> {
    html::find_elements(doc, "title")
        .first()
        .map(|t| text::collapse_whitespace(&text::unescape_html(t.inner(doc))))
        .filter(|t| !t.is_empty())
}

/// Visible text of the content container.
pub(crate) fn body_text(doc: &str) -> String {
    let container = html::find_elements(doc, "main")
        .into_iter()
        .next()
        .or_else(|| html::find_elements(doc, "body").into_iter().next());
    let inner = container.map_or(doc, |e| e.inner(doc));
    text::collapse_whitespace(&text::unescape_html(&html::visible_text(inner)))
}

pub(crate) fn subject(page: &PageSnapshot, customizations: &Customizations) -> String {
    customizations
        .topic
        .clone()
        .or_else(|| page_title(&page.html))
        .unwrap_or_else(|| page.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::MemoryCms;
    use crate::domain::ChangeAction;

    #[test]
    fn test_resolve_known_and_unknown() {
        assert_eq!(
            FixStrategy::resolve("missing_h1").unwrap(),
            FixStrategy::HeadingStructure
        );
        assert!(matches!(
            FixStrategy::resolve("foo_bar"),
            Err(StrategyError::NotFound(ref s)) if s == "foo_bar"
        ));
    }

    #[test]
    fn test_strategy_issue_round_trip() {
        for issue in IssueType::ALL {
            assert_eq!(FixStrategy::for_issue(issue).issue_type(), issue);
        }
    }

    #[test]
    fn test_body_text_prefers_main() {
        let doc = "<html><body><nav>Menu</nav><main><p>Real words</p></main></body></html>";
        assert_eq!(body_text(doc), "Real words");
        assert_eq!(content_container(doc).unwrap(), "main");
    }

    #[test]
    fn test_projected_growth_counts_net_bytes() {
        let doc = "<html><body><h1>A</h1><p>x</p></body></html>";
        let plan = FixPlan {
            page_url: "/".into(),
            page_id: "/".into(),
            issue_type: IssueType::HeadingStructure,
            strategy: FixStrategy::HeadingStructure,
            base_digest: ContentDigest::from_bytes(doc.as_bytes()),
            changes: vec![
                ChangeSet::new("h1", ChangeAction::Update, "<h2>A</h2>"),
                ChangeSet::new("body", ChangeAction::Add, "<p>four</p>"),
            ],
        };
        assert_eq!(plan.projected_growth(doc).unwrap(), "<p>four</p>".len());
    }

    #[tokio::test]
    async fn test_oversized_generation_is_trimmed_to_cap() {
        let cms = MemoryCms::new().with_page("/", "<html><body><main><p>short</p></main></body></html>");
        let generator = crate::fakes::CannedGenerator::new(vec!["word ".repeat(6_000)]);
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let plan = FixStrategy::ThinContent
            .generate_fix_plan(&ctx, "/", &Customizations::default())
            .await
            .unwrap();
        let page = cms.read_page("/").await.unwrap();
        assert!(plan.projected_growth(&page.html).unwrap() <= FixStrategy::ThinContent.max_growth());
    }

    #[tokio::test]
    async fn test_plan_over_growth_cap_is_rejected() {
        let cms = MemoryCms::new().with_page("/", "<html><head></head><body></body></html>");
        let generator = crate::fakes::CannedGenerator::failing();
        let config = SeofixConfig {
            meta_description_max_chars: 4_000,
            ..SeofixConfig::default()
        };
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let custom = Customizations {
            meta_description: Some("long ".repeat(500)),
            ..Default::default()
        };
        let err = FixStrategy::MetaDescription
            .generate_fix_plan(&ctx, "/", &custom)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::RuleViolation(ref m) if m.contains("at most")));
    }

    #[tokio::test]
    async fn test_execute_reports_partial_progress() {
        let cms = MemoryCms::new().with_page("/", "<html><body></body></html>");
        let plan = FixPlan {
            page_url: "/".into(),
            page_id: "/".into(),
            issue_type: IssueType::ThinContent,
            strategy: FixStrategy::ThinContent,
            base_digest: ContentDigest::from_bytes(b"x"),
            changes: vec![
                ChangeSet::new("body", ChangeAction::Add, "<p>one</p>"),
                ChangeSet::new("main", ChangeAction::Add, "<p>two</p>"),
            ],
        };
        let err = plan.execute(&cms, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.applied.len(), 1);
        assert!(matches!(err.source, StrategyError::Cms(CmsError::ElementNotFound { .. })));
    }
}
