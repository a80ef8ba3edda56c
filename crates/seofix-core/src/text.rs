//! Plain-text helpers: escaping, sanitising generated copy, word counts.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap_or_else(|e| panic!("static regex: {e}")))
}

fn markdown_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:#{1,6}\s+|[-*]\s+|\d+\.\s+)|\*\*|__|`")
            .unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Decode the entities `escape_html` produces plus a few common ones.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove tags, leaving their text content.
pub fn strip_tags(markup: &str) -> String {
    tag_re().replace_all(markup, " ").into_owned()
}

/// Turn model output into a single clean line of plain text: markup and
/// markdown removed, entities decoded, whitespace collapsed, wrapping
/// quotes dropped. The result is NOT escaped.
pub fn sanitize_generated(raw: &str) -> String {
    let no_tags = strip_tags(raw);
    let no_md = markdown_re().replace_all(&no_tags, "");
    let text = collapse_whitespace(&unescape_html(&no_md));
    text.trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}

/// Split model output into sanitised paragraphs on blank lines.
pub fn sanitize_paragraphs(raw: &str) -> Vec<String> {
    raw.replace("\r\n", "\n")
        .split("\n\n")
        .map(sanitize_generated)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Shorten to at most `max` characters, preferring a word boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    let shortened = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > max / 2 => &cut[..idx],
        _ => cut.as_str(),
    };
    shortened
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'))
        .to_string()
}

/// The first `limit` words of `text`.
pub fn first_words(text: &str, limit: usize) -> String {
    text.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}
