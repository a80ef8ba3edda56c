//! Exactly one `<h1>` per page: add one when missing, demote the extras.

use super::{content_container, page_title, subject, Customizations, PlanContext, StrategyResult};
use crate::cms::html::{self, Element};
use crate::domain::{ChangeAction, ChangeSet, PageSnapshot, ValidationRule};
use crate::text;

const MAX_HEADING_CHARS: usize = 120;
/// A new `<h1>` of `MAX_HEADING_CHARS`, fully escaped. Demotions add nothing.
pub(crate) const MAX_GROWTH_BYTES: usize = 1024;

/// Tags a new `<h1>` may be placed in front of, in preference order.
const ANCHOR_TAGS: &[&str] = &["h2", "h3", "h4", "h5", "h6", "p"];

pub(crate) async fn plan(
    ctx: &PlanContext<'_>,
    page: &PageSnapshot,
    customizations: &Customizations,
) -> StrategyResult<Vec<ChangeSet>> {
    let doc = &page.html;
    let h1s = html::find_elements(doc, "h1");
    match h1s.len() {
        0 => add_h1(ctx, page, customizations).await.map(|c| vec![c]),
        1 => Ok(Vec::new()),
        // nth-of-type counts unclosed h1s too; positions can't be trusted
        _ if h1s.iter().any(|h1| !h1.has_closing_tag()) => Ok(Vec::new()),
        _ => Ok(h1s.iter().skip(1).map(|h1| demote(doc, h1)).collect()),
    }
}

async fn add_h1(
    ctx: &PlanContext<'_>,
    page: &PageSnapshot,
    customizations: &Customizations,
) -> StrategyResult<ChangeSet> {
    let doc = &page.html;
    let heading = match page_title(doc) {
        // Titles often carry a "| Site name" suffix.
        Some(title) => title
            .split(['|', '–', '—'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
        None => String::new(),
    };
    let heading = if heading.is_empty() {
        let prompt = format!(
            "Write a concise H1 heading, under {MAX_HEADING_CHARS} characters, for a web page \
             about \"{}\".",
            subject(page, customizations)
        );
        text::sanitize_generated(&ctx.generate(&prompt).await?)
    } else {
        heading
    };
    let heading = text::truncate_chars(&heading, MAX_HEADING_CHARS);
    let markup = format!("<h1>{}</h1>", text::escape_html(&heading));

    let anchor = ANCHOR_TAGS
        .iter()
        .filter_map(|tag| html::find_elements(doc, tag).into_iter().next())
        .min_by_key(|e| e.start);

    let change = match anchor {
        Some(el) => {
            let selector = format!("{}:nth-of-type(1)", el.tag);
            ChangeSet::new(
                selector,
                ChangeAction::Update,
                format!("{markup}\n{}", el.outer(doc)),
            )
        }
        None => ChangeSet::new(content_container(doc)?, ChangeAction::Add, markup),
    };
    Ok(change
        .with_rule(ValidationRule::NotEmpty)
        .with_rule(ValidationRule::MustContain(heading)))
}

/// Rewrite one extra `<h1>` as an `<h2>`, keeping attributes and content.
///
/// Earlier demotions shift later ones, so every change targets the second
/// remaining `h1`.
fn demote(doc: &str, h1: &Element) -> ChangeSet {
    let open = &doc[h1.start..h1.open_end];
    let inner = h1.inner(doc);
    let markup = format!("<h2{}{}</h2>", &open[3..], inner);
    let heading_text = text::collapse_whitespace(&text::unescape_html(&text::strip_tags(inner)));

    let change = ChangeSet::new("h1:nth-of-type(2)", ChangeAction::Update, markup);
    if heading_text.is_empty() {
        // Image-only heading: nothing textual to preserve.
        change.with_rule(ValidationRule::MaxLength(0))
    } else {
        change.with_rule(ValidationRule::MustContain(heading_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::{ContentSink, MemoryCms};
    use crate::config::SeofixConfig;
    use crate::fakes::CannedGenerator;

    #[tokio::test]
    async fn test_missing_h1_from_title_goes_before_first_heading() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let doc = "<html><head><title>Rye Bread | Bakery</title></head><body><p>intro</p><h2>Recipe</h2></body></html>";
        let page = PageSnapshot::new("/", "/", doc);
        let changes = plan(&ctx, &page, &Customizations::default()).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].selector, "p:nth-of-type(1)");
        assert_eq!(changes[0].content, "<h1>Rye Bread</h1>\n<p>intro</p>");
        assert!(changes[0].validate().is_ok());
    }

    #[tokio::test]
    async fn test_single_h1_is_fine() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let page = PageSnapshot::new("/", "/", "<html><body><h1>One</h1></body></html>");
        assert!(plan(&ctx, &page, &Customizations::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extra_h1s_demoted_in_sequence() {
        let doc = r#"<html><body><h1>Main</h1><h1 class="x">Second</h1><h1>Third</h1></body></html>"#;
        let cms = MemoryCms::new().with_page("/", doc);
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let page = cms.read_page("/").await.unwrap();
        let changes = plan(&ctx, &page, &Customizations::default()).await.unwrap();
        assert_eq!(changes.len(), 2);
        for change in &changes {
            cms.apply_change("/", change).await.unwrap();
        }
        assert_eq!(
            cms.page_html("/").unwrap(),
            r#"<html><body><h1>Main</h1><h2 class="x">Second</h2><h2>Third</h2></body></html>"#
        );
    }

    #[tokio::test]
    async fn test_unclosed_extra_h1_plans_nothing() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = SeofixConfig::default();
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let doc = "<html><body><h1>Main</h1><h1>Stray<p>text</p><h1>Third</h1></body></html>";
        let page = PageSnapshot::new("/", "/", doc);
        assert!(plan(&ctx, &page, &Customizations::default()).await.unwrap().is_empty());
    }
}
