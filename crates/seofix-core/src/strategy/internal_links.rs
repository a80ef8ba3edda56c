//! Add contextual links to other pages of the same site.

use std::collections::HashSet;

use super::{
    content_container, subject, Customizations, PlanContext, StrategyError, StrategyResult,
};
use crate::cms::{html, page_path};
use crate::domain::{ChangeAction, ChangeSet, PageSnapshot, ValidationRule};
use crate::text;

const MAX_PARAGRAPH_BYTES: usize = 1_024;
const MAX_LEAD_IN_CHARS: usize = 200;
/// Link paragraphs added by one fix; further targets wait for the next run.
const MAX_LINKS_PER_FIX: usize = 5;
pub(crate) const MAX_GROWTH_BYTES: usize = MAX_LINKS_PER_FIX * MAX_PARAGRAPH_BYTES;

/// Site-relative paths and http(s) URLs. Anything else could run script or
/// leave the site.
fn is_linkable(url: &str) -> bool {
    let url = url.trim();
    if url.starts_with('/') {
        return !url.starts_with("//");
    }
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Paths the page already links to.
fn linked_paths(doc: &str) -> HashSet<String> {
    html::find_elements(doc, "a")
        .iter()
        .filter_map(|a| a.attr("href"))
        .filter(|href| !href.starts_with("mailto:") && !href.starts_with("tel:"))
        .map(page_path)
        .collect()
}

pub(crate) async fn plan(
    ctx: &PlanContext<'_>,
    page: &PageSnapshot,
    customizations: &Customizations,
) -> StrategyResult<Vec<ChangeSet>> {
    if customizations.internal_links.is_empty() {
        return Err(StrategyError::MissingInput(
            "internal_links customization lists no link targets".to_string(),
        ));
    }
    if let Some(bad) = customizations
        .internal_links
        .iter()
        .find(|t| !is_linkable(&t.url))
    {
        return Err(StrategyError::InvalidInput(format!(
            "link target '{}' is not a site path or http(s) URL",
            bad.url
        )));
    }
    let container = content_container(&page.html)?;
    let mut linked = linked_paths(&page.html);
    linked.insert(page_path(&page.url));
    let topic = subject(page, customizations);

    let mut changes = Vec::new();
    for target in &customizations.internal_links {
        if changes.len() == MAX_LINKS_PER_FIX {
            break;
        }
        let path = page_path(&target.url);
        if !linked.insert(path) {
            continue;
        }
        let anchor = match text::sanitize_generated(&target.anchor) {
            a if a.is_empty() => target.url.clone(),
            a => a,
        };
        let prompt = format!(
            "Write one short sentence, without a link, that leads readers of a page about \
             \"{topic}\" on to a related page titled \"{anchor}\"."
        );
        let lead_in = text::truncate_chars(
            &text::sanitize_generated(&ctx.generate(&prompt).await?),
            MAX_LEAD_IN_CHARS,
        );
        let paragraph = format!(
            "\n<p>{} <a href=\"{}\">{}</a></p>",
            text::escape_html(&lead_in),
            text::escape_html(target.url.trim()),
            text::escape_html(&anchor),
        );
        if paragraph.len() > MAX_PARAGRAPH_BYTES {
            return Err(StrategyError::InvalidInput(format!(
                "link paragraph for '{}' is {} bytes, limit is {MAX_PARAGRAPH_BYTES}",
                target.url,
                paragraph.len()
            )));
        }
        changes.push(
            ChangeSet::new(container, ChangeAction::Add, paragraph)
                .with_rule(ValidationRule::NotEmpty)
                .with_rule(ValidationRule::MustContain(anchor))
                .with_rule(ValidationRule::MaxLength(MAX_PARAGRAPH_BYTES)),
        );
    }
    Ok(changes)
}
