//! Expand pages whose body falls under the minimum word count.

use super::{body_text, content_container, subject, Customizations, PlanContext, StrategyResult};
use crate::domain::{ChangeAction, ChangeSet, PageSnapshot, ValidationRule};
use crate::text;

/// Shortest expansion worth writing, in characters.
const MIN_EXPANSION_CHARS: usize = 100;
/// Largest expansion section, markup included.
pub(crate) const MAX_GROWTH_BYTES: usize = 16 * 1024;

const SECTION_OPEN: &str = "\n<section class=\"seofix-expanded\">";
const SECTION_CLOSE: &str = "\n</section>\n";

pub(crate) async fn plan(
    ctx: &PlanContext<'_>,
    page: &PageSnapshot,
    customizations: &Customizations,
) -> StrategyResult<Vec<ChangeSet>> {
    let minimum = ctx.config.thin_content_min_words;
    let existing = body_text(&page.html);
    let words = text::word_count(&existing);
    if words >= minimum {
        return Ok(Vec::new());
    }
    let container = content_container(&page.html)?;

    let wanted = (minimum - words).max(50) + 50;
    let prompt = format!(
        "Write about {wanted} words of additional, genuinely useful content for a web page \
         about \"{}\". Use short paragraphs separated by blank lines. The page currently \
         says: {}",
        subject(page, customizations),
        text::first_words(&existing, 200),
    );
    let generated = ctx.generate(&prompt).await?;

    Ok(vec![ChangeSet::new(container, ChangeAction::Add, section(&generated))
        .with_rule(ValidationRule::NotEmpty)
        .with_rule(ValidationRule::MinLength(MIN_EXPANSION_CHARS))
        .with_rule(ValidationRule::MaxLength(MAX_GROWTH_BYTES))])
}

/// Wrap generated paragraphs in a section no larger than `MAX_GROWTH_BYTES`.
/// Paragraphs that no longer fit are dropped; a first paragraph that is too
/// long on its own is shortened.
fn section(generated: &str) -> String {
    const P_MARKUP: usize = "\n<p></p>".len();
    let mut section = String::from(SECTION_OPEN);
    let mut wrote_any = false;
    for paragraph in text::sanitize_paragraphs(generated) {
        let room = MAX_GROWTH_BYTES.saturating_sub(section.len() + SECTION_CLOSE.len() + P_MARKUP);
        let mut escaped = text::escape_html(&paragraph);
        if escaped.len() > room {
            if wrote_any {
                break;
            }
            // escaping at most sextuples a character's bytes
            escaped = text::escape_html(&text::truncate_chars(&paragraph, room / 6));
        }
        section.push_str("\n<p>");
        section.push_str(&escaped);
        section.push_str("</p>");
        wrote_any = true;
    }
    section.push_str(SECTION_CLOSE);
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::MemoryCms;
    use crate::config::SeofixConfig;
    use crate::fakes::CannedGenerator;

    fn config(min_words: usize) -> SeofixConfig {
        SeofixConfig {
            thin_content_min_words: min_words,
            ..SeofixConfig::default()
        }
    }

    #[tokio::test]
    async fn test_long_page_needs_nothing() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::failing();
        let config = config(3);
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let page = PageSnapshot::new("/", "/", "<html><body><p>one two three four</p></body></html>");
        let changes = plan(&ctx, &page, &Customizations::default()).await.unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_expansion_goes_into_main() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::new(vec![format!(
            "{}\n\nSecond <i>paragraph</i> with more detail about rye.",
            "Sourdough is a slow bread. ".repeat(6)
        )]);
        let config = config(300);
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let page = PageSnapshot::new(
            "/",
            "/",
            "<html><body><main><p>Short page.</p></main></body></html>",
        );
        let changes = plan(&ctx, &page, &Customizations::default()).await.unwrap();
        assert_eq!(changes[0].selector, "main");
        assert_eq!(changes[0].content.matches("<p>").count(), 2);
        assert!(!changes[0].content.contains("<i>"));
        assert!(changes[0].validate().is_ok());
    }

    #[tokio::test]
    async fn test_short_generation_violates_rules() {
        let cms = MemoryCms::new();
        let generator = CannedGenerator::new(vec!["Too short.".into()]);
        let config = config(300);
        let ctx = PlanContext {
            cms: &cms,
            generator: &generator,
            config: &config,
        };
        let page = PageSnapshot::new("/", "/", "<html><body></body></html>");
        let changes = plan(&ctx, &page, &Customizations::default()).await.unwrap();
        assert!(changes[0].validate().unwrap_err().contains("min_length"));
    }

    #[test]
    fn test_section_never_exceeds_cap() {
        let long = "Rye & \"spelt\" loaves. ".repeat(2_000);
        let many = vec!["Twenty words of decent filler text here."; 1_000].join("\n\n");
        for generated in [long, many] {
            let markup = section(&generated);
            assert!(markup.len() <= MAX_GROWTH_BYTES, "{} bytes", markup.len());
            assert!(markup.contains("<p>"));
            assert!(markup.ends_with(SECTION_CLOSE));
        }
    }
}
