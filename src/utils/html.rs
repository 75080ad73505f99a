//! Best-effort HTML scanning for icon declarations
//!
//! Only two things are ever looked for: a `<link>` naming the page icon and
//! a `<meta http-equiv="refresh">` redirect. Both are found with regular
//! expressions over the raw markup rather than a full parser.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// `rel` values that declare a page icon (compared case-insensitively)
pub const ICON_REL_VALUES: &[&str] = &["shortcut", "icon", "shortcut icon"];

/// The first icon `<link>` of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconLink {
    /// Raw `href`, entity-decoded but not yet resolved
    pub href: Option<String>,
}

fn regex(pattern: &'static str, desc: &'static str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid {desc} regex: {err}"))
}

fn capture_first<'t>(caps: &Captures<'t>, groups: &[usize]) -> Option<&'t str> {
    groups
        .iter()
        .find_map(|idx| caps.get(*idx).map(|m| m.as_str()))
}

fn comment_regex() -> &'static Regex {
    static COMMENT: OnceLock<Regex> = OnceLock::new();
    COMMENT.get_or_init(|| regex("(?s)<!--.*?-->", "comment"))
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    static ATTRS: OnceLock<Regex> = OnceLock::new();
    let attrs = ATTRS.get_or_init(|| {
        regex(
            r#"(?is)\s([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
            "attribute",
        )
    });

    attrs.captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if key.eq_ignore_ascii_case(name) {
            capture_first(&caps, &[2, 3, 4]).map(decode_entities)
        } else {
            None
        }
    })
}

fn link_tags(html: &str) -> impl Iterator<Item = &str> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let link = LINK.get_or_init(|| regex(r"(?is)<link\b[^>]*>", "link tag"));
    link.find_iter(html).map(|m| m.as_str())
}

fn meta_tags(html: &str) -> impl Iterator<Item = &str> {
    static META: OnceLock<Regex> = OnceLock::new();
    let meta = META.get_or_init(|| regex(r"(?is)<meta\b[^>]*>", "meta tag"));
    meta.find_iter(html).map(|m| m.as_str())
}

/// Whether a `rel` attribute value names a page icon
pub fn is_icon_rel(rel: &str) -> bool {
    let normalized = rel.split_whitespace().collect::<Vec<_>>().join(" ");
    ICON_REL_VALUES
        .iter()
        .any(|value| normalized.eq_ignore_ascii_case(value))
}

/// Find the first `<link>` whose `rel` declares the page icon
pub fn find_icon_link(html: &str) -> Option<IconLink> {
    let html = comment_regex().replace_all(html, "");

    link_tags(&html)
        .find(|tag| attribute(tag, "rel").is_some_and(|rel| is_icon_rel(&rel)))
        .map(|tag| IconLink {
            href: attribute(tag, "href").filter(|href| !href.trim().is_empty()),
        })
}

/// Find the target of the first `<meta http-equiv="refresh">` that names one
pub fn find_refresh_url(html: &str) -> Option<String> {
    let html = comment_regex().replace_all(html, "");

    meta_tags(&html)
        .filter(|tag| {
            attribute(tag, "http-equiv")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("refresh"))
        })
        .find_map(|tag| attribute(tag, "content").and_then(|content| extract_refresh_url(&content)))
}

/// Extract the target from a refresh `content` value such as `5; URL=/next`
///
/// The match is case-insensitive and stops at the first `;`. Surrounding
/// whitespace and quotes are stripped.
///
/// # Examples
///
/// ```rust
/// use favicon_service::utils::html::extract_refresh_url;
///
/// assert_eq!(extract_refresh_url("0; URL=/home").as_deref(), Some("/home"));
/// assert_eq!(extract_refresh_url("30"), None);
/// ```
pub fn extract_refresh_url(content: &str) -> Option<String> {
    static REFRESH: OnceLock<Regex> = OnceLock::new();
    let refresh = REFRESH.get_or_init(|| regex("(?i)url=([^;]+)", "refresh url"));

    refresh
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Decode the handful of entities that show up in attribute values
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
