//! HTML parser for link discovery
//!
//! Outbound links are read from the raw page, not from the extracted
//! markdown, so navigation menus and sidebars still feed the frontier.

use crate::crawler::fetcher::DiscoveredLink;
use crate::url::resolve_url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts the links of an HTML page together with their anchor text
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links (same page anchors)
/// - Anything that does not resolve to an http(s) URL
///
/// Links are resolved against `page_url` and normalized (fragment and
/// trailing slash removed). Each URL is returned once, at its first
/// occurrence; a later occurrence only contributes text if the first had none.
///
/// # Example
///
/// ```
/// use markdoc::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/docs/guide/">Guide</a><a href="mailto:x@example.com">Mail</a>"#;
/// let page = Url::parse("https://example.com/docs/").unwrap();
/// let links = extract_links(html, &page);
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].url, "https://example.com/docs/guide");
/// assert_eq!(links[0].text, "Guide");
/// ```
pub fn extract_links(html: &str, page_url: &Url) -> Vec<DiscoveredLink> {
    let document = Html::parse_document(html);
    let mut links: Vec<DiscoveredLink> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let Some(url) = resolve_link(href, page_url) else {
            continue;
        };

        let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));

        if seen.insert(url.clone()) {
            links.push(DiscoveredLink { url, text });
        } else if !text.is_empty() {
            if let Some(existing) = links.iter_mut().find(|l| l.url == url && l.text.is_empty()) {
                existing.text = text;
            }
        }
    }

    links
}

/// Extracts the `<title>` of an HTML page
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Resolves a link href to a normalized absolute URL
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    resolve_url(page_url, href).ok().map(|url| url.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
