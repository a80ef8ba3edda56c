//! Add or replace `<meta name="description">`.

use super::{body_text, subject, Customizations, PlanContext, StrategyError, StrategyResult};
use crate::cms::html::{self, Selector};
use crate::domain::{ChangeAction, ChangeSet, PageSnapshot, ValidationRule};
use crate::text;

const SELECTOR: &str = r#"meta[name="description"]"#;

/// Room for the tag plus a default-length description, fully escaped.
pub(crate) const MAX_GROWTH_BYTES: usize = 1024;

pub(crate) async fn plan(
    ctx: &PlanContext<'_>,
    page: &PageSnapshot,
    customizations: &Customizations,
) -> StrategyResult<Vec<ChangeSet>> {
    let max = ctx.config.meta_description_max_chars;
    let raw = match &customizations.meta_description {
        Some(supplied) => supplied.clone(),
        None => {
            let prompt = format!(
                "Write a meta description of at most {max} characters for a web page about \
                 \"{}\". The page begins: {}",
                subject(page, customizations),
                text::first_words(&body_text(&page.html), 120),
            );
            ctx.generate(&prompt).await?
        }
    };
    let description = text::truncate_chars(&text::sanitize_generated(&raw), max);
    let tag = format!(
        r#"<meta name="description" content="{}">"#,
        text::escape_html(&description)
    );

    let existing = Selector::parse(SELECTOR)?.first(&page.html);
    let change = match existing {
        // already in place
        Some(el) if el.attr("content").map(text::unescape_html).as_deref() == Some(description.as_str()) => {
            return Ok(Vec::new())
        }
        Some(_) => ChangeSet::new(SELECTOR, ChangeAction::Update, tag),
        None if !html::find_elements(&page.html, "head").is_empty() => {
            ChangeSet::new("head", ChangeAction::Add, tag)
        }
        None => return Err(StrategyError::NoTarget("no <head>".to_string())),
    };

    Ok(vec![change
        .with_rule(ValidationRule::NotEmpty)
        .with_rule(ValidationRule::MaxLength(max))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::MemoryCms;
    use crate::config::SeofixConfig;
    use crate::fakes::CannedGenerator;

    fn page(html: &str) -> PageSnapshot {
        PageSnapshot::new("/", "/", html)
    }

    #[tokio::test]
    async fn test_customization_wins_and_adds_to_head() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let custom = Customizations {
            meta_description: Some("Fresh <b>bread</b> & pastries".into()),
            ..Default::default()
        };
        let changes = plan(&ctx, &page("<html><head></head><body></body></html>"), &custom)
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].selector, "head");
        assert_eq!(
            changes[0].content,
            r#"<meta name="description" content="Fresh bread &amp; pastries">"#
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_tag_is_updated_and_truncated() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::new(vec!["word ".repeat(80)]);
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let doc = r#"<html><head><meta name="description" content=""></head><body>x</body></html>"#;
        let changes = plan(&ctx, &page(doc), &Customizations::default()).await.unwrap();
        assert_eq!(changes[0].action, ChangeAction::Update);
        assert!(changes[0].payload_text().chars().count() <= 160);
        assert!(changes[0].validate().is_ok());
    }

    #[tokio::test]
    async fn test_matching_description_plans_nothing() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let custom = Customizations {
            meta_description: Some("Bread & butter".into()),
            ..Default::default()
        };
        let doc = r#"<html><head><meta name="description" content="Bread &amp; butter"></head></html>"#;
        assert!(plan(&ctx, &page(doc), &custom).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_head_is_no_target() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::new(vec!["A fine page.".into()]);
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let err = plan(&ctx, &page("<body>x</body>"), &Customizations::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::NoTarget(_)));
    }
}
