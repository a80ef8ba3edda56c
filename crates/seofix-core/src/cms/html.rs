//! Minimal HTML element editor shared by the in-memory and directory CMS
//! backends.
//!
//! This is a tag scanner, not a full HTML parser: it understands start and
//! end tags, void elements, self-closing tags, comments and the raw-text
//! bodies of `<script>` and `<style>`. That is enough to address elements by
//! selector and splice markup into them without disturbing the bytes around
//! the edit.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::cms::{CmsError, CmsResult};
use crate::domain::{AppliedChange, ChangeAction, ChangeSet};

/// Elements that never have a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<!--.*?-->|<(/)?([a-zA-Z][a-zA-Z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
            .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
        )
        .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

fn selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^([a-zA-Z][a-zA-Z0-9-]*)(?:\[\s*([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\]"']*))\s*\])?(?::nth-of-type\(\s*(\d+)\s*\))?$"#,
        )
        .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// One start or end tag found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    /// Lower-cased tag name.
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    /// Raw attribute text between the name and `>`.
    pub raw_attrs: String,
    pub start: usize,
    pub end: usize,
}

impl TagToken {
    pub fn attrs(&self) -> Vec<(String, String)> {
        parse_attrs(&self.raw_attrs)
    }
}

/// Parse an attribute list into lower-cased names and raw values.
pub fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// All tags in document order, skipping comments and raw-text bodies.
pub fn tokenize(html: &str) -> Vec<TagToken> {
    let lower = html.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut skip_until = 0usize;

    for caps in tag_re().captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < skip_until {
            continue;
        }
        let Some(name) = caps.get(2) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some();
        let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        let self_closing = raw_attrs.trim_end().ends_with('/');

        if !closing && (name == "script" || name == "style") {
            let close = format!("</{name}");
            if let Some(offset) = lower[whole.end()..].find(&close) {
                skip_until = whole.end() + offset;
            }
        }

        tokens.push(TagToken {
            name,
            closing,
            self_closing,
            raw_attrs: raw_attrs.trim_end_matches('/').to_string(),
            start: whole.start(),
            end: whole.end(),
        });
    }
    tokens
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// Byte span of one element. For void or unclosed elements the inner span is
/// empty and `end == open_end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub start: usize,
    pub open_end: usize,
    pub inner_end: usize,
    pub end: usize,
}

impl Element {
    pub fn outer<'a>(&self, html: &'a str) -> &'a str {
        &html[self.start..self.end]
    }

    pub fn inner<'a>(&self, html: &'a str) -> &'a str {
        &html[self.open_end..self.inner_end]
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_closing_tag(&self) -> bool {
        self.end > self.inner_end
    }
}

/// Every element named `tag`, in document order of their start tags.
pub fn find_elements(html: &str, tag: &str) -> Vec<Element> {
    let tag = tag.to_ascii_lowercase();
    let mut done = Vec::new();
    let mut open: Vec<TagToken> = Vec::new();

    for token in tokenize(html).into_iter().filter(|t| t.name == tag) {
        if token.closing {
            if let Some(start) = open.pop() {
                done.push(Element {
                    tag: tag.clone(),
                    attrs: start.attrs(),
                    start: start.start,
                    open_end: start.end,
                    inner_end: token.start,
                    end: token.end,
                });
            }
        } else if token.self_closing || is_void(&tag) {
            done.push(leaf(&tag, &token));
        } else {
            open.push(token);
        }
    }
    done.extend(open.iter().map(|t| leaf(&tag, t)));
    done.sort_by_key(|e| e.start);
    done
}

fn leaf(tag: &str, token: &TagToken) -> Element {
    Element {
        tag: tag.to_string(),
        attrs: token.attrs(),
        start: token.start,
        open_end: token.end,
        inner_end: token.end,
        end: token.end,
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// Parsed element selector.
///
/// `nth-of-type` counts matching tags in document order rather than among
/// siblings, which is what scripted fixes need on a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub tag: String,
    pub attr: Option<(String, String)>,
    pub nth: Option<usize>,
}

impl Selector {
    pub fn parse(raw: &str) -> CmsResult<Self> {
        let caps = selector_re()
            .captures(raw.trim())
            .ok_or_else(|| CmsError::InvalidSelector(raw.to_string()))?;
        let tag = caps
            .get(1)
            .map(|m| m.as_str().to_ascii_lowercase())
            .ok_or_else(|| CmsError::InvalidSelector(raw.to_string()))?;
        let attr = caps.get(2).map(|name| {
            let value = caps
                .get(3)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            (name.as_str().to_ascii_lowercase(), value)
        });
        let nth = match caps.get(6) {
            Some(m) => {
                let n: usize = m
                    .as_str()
                    .parse()
                    .map_err(|_| CmsError::InvalidSelector(raw.to_string()))?;
                if n == 0 {
                    return Err(CmsError::InvalidSelector(raw.to_string()));
                }
                Some(n)
            }
            None => None,
        };
        Ok(Self { tag, attr, nth })
    }

    /// All elements the selector matches, in document order.
    pub fn select(&self, html: &str) -> Vec<Element> {
        let mut matches: Vec<Element> = find_elements(html, &self.tag)
            .into_iter()
            .filter(|e| match &self.attr {
                Some((name, value)) => e.attr(name) == Some(value.as_str()),
                None => true,
            })
            .collect();
        match self.nth {
            Some(n) if n <= matches.len() => vec![matches.swap_remove(n - 1)],
            Some(_) => Vec::new(),
            None => matches,
        }
    }

    pub fn first(&self, html: &str) -> Option<Element> {
        self.select(html).into_iter().next()
    }
}

/// Apply one change to a document, returning the new document and the audit
/// record of what moved.
pub fn apply_change(html: &str, change: &ChangeSet) -> CmsResult<(String, AppliedChange)> {
    let selector = Selector::parse(&change.selector)?;
    let element = selector
        .first(html)
        .ok_or_else(|| CmsError::ElementNotFound {
            selector: change.selector.clone(),
        })?;
    let before = element.outer(html).to_string();

    let (updated, after) = match change.action {
        ChangeAction::Add => {
            if !element.has_closing_tag() {
                return Err(CmsError::Rejected(format!(
                    "cannot append children to <{}>",
                    element.tag
                )));
            }
            let mut out = String::with_capacity(html.len() + change.content.len());
            out.push_str(&html[..element.inner_end]);
            out.push_str(&change.content);
            out.push_str(&html[element.inner_end..]);
            let new_end = element.end + change.content.len();
            let after = out[element.start..new_end].to_string();
            (out, Some(after))
        }
        ChangeAction::Update => {
            let out = splice(html, element.start, element.end, &change.content);
            (out, Some(change.content.clone()))
        }
        ChangeAction::Remove => (splice(html, element.start, element.end, ""), None),
    };

    Ok((
        updated,
        AppliedChange {
            element: change.selector.clone(),
            before: Some(before),
            after,
            timestamp: Utc::now(),
        },
    ))
}

fn splice(html: &str, start: usize, end: usize, with: &str) -> String {
    let mut out = String::with_capacity(html.len() - (end - start) + with.len());
    out.push_str(&html[..start]);
    out.push_str(with);
    out.push_str(&html[end..]);
    out
}

/// Text content with tags, comments and raw-text bodies removed.
pub fn visible_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0usize;
    let mut skip_to: Option<usize> = None;
    for token in tokenize(html) {
        if let Some(until) = skip_to {
            if token.start < until {
                continue;
            }
            skip_to = None;
        }
        if token.start > cursor {
            out.push_str(&html[cursor..token.start]);
        }
        out.push(' ');
        cursor = token.end;
        if !token.closing && (token.name == "script" || token.name == "style") {
            skip_to = next_close(html, token.end, &token.name);
            if let Some(until) = skip_to {
                cursor = until;
            }
        }
    }
    if cursor < html.len() {
        out.push_str(&html[cursor..]);
    }
    comment_re().replace_all(&out, " ").into_owned()
}

fn next_close(html: &str, from: usize, tag: &str) -> Option<usize> {
    html[from..]
        .to_ascii_lowercase()
        .find(&format!("</{tag}"))
        .map(|offset| from + offset)
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap_or_else(|e| panic!("static regex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Bakery</title><meta name="description" content="old"></head><body><div><div>inner</div></div><p>one</p><p>two</p></body></html>"#;

    #[test]
    fn test_selector_parse_forms() {
        assert_eq!(Selector::parse("main").unwrap().tag, "main");
        let s = Selector::parse(r#"meta[name="description"]"#).unwrap();
        assert_eq!(s.attr, Some(("name".into(), "description".into())));
        assert_eq!(Selector::parse("p:nth-of-type(2)").unwrap().nth, Some(2));
        assert!(Selector::parse("p:nth-of-type(0)").is_err());
        assert!(Selector::parse("div > p").is_err());
    }

    #[test]
    fn test_nested_same_tag_spans() {
        let divs = find_elements(PAGE, "div");
        assert_eq!(divs.len(), 2);
        assert_eq!(divs[0].outer(PAGE), "<div><div>inner</div></div>");
        assert_eq!(divs[1].inner(PAGE), "inner");
    }

    #[test]
    fn test_void_element_has_no_inner() {
        let metas = find_elements(PAGE, "meta");
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].attr("content"), Some("old"));
        assert!(!metas[0].has_closing_tag());
    }

    #[test]
    fn test_script_body_is_not_tokenized() {
        let html = "<body><script>if (a < b) { x = '<p>'; }</script><p>real</p></body>";
        let ps = find_elements(html, "p");
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].inner(html), "real");
    }

    #[test]
    fn test_add_appends_inside_element() {
        let change = ChangeSet::new("head", ChangeAction::Add, "<link rel=\"x\">");
        let (out, applied) = apply_change(PAGE, &change).unwrap();
        assert!(out.contains("content=\"old\"><link rel=\"x\"></head>"));
        assert!(applied.after.unwrap().ends_with("<link rel=\"x\"></head>"));
    }

    #[test]
    fn test_update_replaces_outer_markup() {
        let change = ChangeSet::new(
            r#"meta[name="description"]"#,
            ChangeAction::Update,
            r#"<meta name="description" content="new">"#,
        );
        let (out, applied) = apply_change(PAGE, &change).unwrap();
        assert!(out.contains(r#"content="new""#));
        assert!(!out.contains(r#"content="old""#));
        assert_eq!(
            applied.before.as_deref(),
            Some(r#"<meta name="description" content="old">"#)
        );
    }

    #[test]
    fn test_remove_nth_of_type() {
        let change = ChangeSet::new("p:nth-of-type(2)", ChangeAction::Remove, "");
        let (out, applied) = apply_change(PAGE, &change).unwrap();
        assert!(out.contains("<p>one</p></body>"));
        assert!(applied.after.is_none());
    }

    #[test]
    fn test_missing_element_errors() {
        let change = ChangeSet::new("main", ChangeAction::Add, "<p>x</p>");
        assert!(matches!(
            apply_change(PAGE, &change),
            Err(CmsError::ElementNotFound { .. })
        ));
    }

    #[test]
    fn test_add_into_void_rejected() {
        let change = ChangeSet::new("meta", ChangeAction::Add, "x");
        assert!(matches!(apply_change(PAGE, &change), Err(CmsError::Rejected(_))));
    }

    #[test]
    fn test_visible_text_skips_scripts_and_comments() {
        let html = "<body><!-- hidden --><p>Hello</p><script>var x = 1;</script><p>world</p></body>";
        let words: Vec<String> = visible_text(html)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        assert_eq!(words, vec!["Hello", "world"]);
    }
}
