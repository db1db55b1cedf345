//! Link extraction from fetched HTML
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document
//! - `<link rel="canonical" href="...">`
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` links and data URIs
//! - Fragment-only links
//! - Anything that is not HTTP(S) once resolved

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts outbound links from an HTML page
///
/// Relative links are resolved against `base_url` and fragments are
/// stripped. Each address appears once, in document order.
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `base_url` - The address the page was served from (after redirects)
///
/// # Returns
///
/// A vector of absolute URLs found in the HTML
///
/// # Example
///
/// ```
/// use furlong::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/racing/profiles/horse/42#form">Frankel</a>"#;
/// let base = Url::parse("https://www.sportinglife.com/racing/results").unwrap();
/// assert_eq!(
///     extract_links(html, &base),
///     vec!["https://www.sportinglife.com/racing/profiles/horse/42".to_string()]
/// );
/// ```
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(absolute) = resolve_link(href, base_url) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL without its fragment
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);

    Some(absolute.into())
}
