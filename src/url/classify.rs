use super::{Classification, UrlKind};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Ordered matcher table, checked against the normalized path. First match wins.
///
/// Profile matchers insist on the trailing numeric id so a bare
/// `/racing/profiles/horse` index page never lands in the store.
static MATCHERS: LazyLock<Vec<(Regex, Classification)>> = LazyLock::new(|| {
    let table: [(&str, Classification); 5] = [
        (
            r"^/racing/results/\d{4}-\d{2}-\d{2}/[\w-]+/\d+/[\w-]+$",
            Classification::entity(UrlKind::Race),
        ),
        (
            r"^/racing/profiles/horse/\d+$",
            Classification::entity(UrlKind::Horse),
        ),
        (
            r"^/racing/profiles/jockey/\d+$",
            Classification::entity(UrlKind::Jockey),
        ),
        (
            r"^/racing/profiles/trainer/\d+$",
            Classification::entity(UrlKind::Trainer),
        ),
        (
            r"^/racing/results/\d{4}-\d{2}-\d{2}(/[\w-]+)?$",
            Classification::LISTING,
        ),
    ];

    table
        .into_iter()
        .filter_map(|(pattern, class)| match Regex::new(pattern) {
            Ok(re) => Some((re, class)),
            Err(e) => {
                tracing::error!("Skipping invalid classifier pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Classifies a normalized address by its path
///
/// Pure and deterministic: the same address always yields the same
/// classification. Addresses that match no matcher are plain navigation.
///
/// # Examples
///
/// ```
/// use furlong::url::{classify, UrlKind, UrlShape};
/// use url::Url;
///
/// let race = Url::parse(
///     "https://www.sportinglife.com/racing/results/2024-03-02/kempton/812345/novice-hurdle",
/// ).unwrap();
/// assert_eq!(classify(&race).kind, UrlKind::Race);
///
/// let day = Url::parse("https://www.sportinglife.com/racing/results/2024-03-02").unwrap();
/// assert_eq!(classify(&day).shape, UrlShape::Listing);
/// assert_eq!(classify(&day).kind, UrlKind::Unknown);
/// ```
pub fn classify(url: &Url) -> Classification {
    classify_path(url.path())
}

/// Classifies a bare path such as `/racing/profiles/horse/123`
pub fn classify_path(path: &str) -> Classification {
    MATCHERS
        .iter()
        .find(|(re, _)| re.is_match(path))
        .map(|(_, class)| *class)
        .unwrap_or(Classification::NAVIGATION)
}
