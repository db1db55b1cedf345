use url::Url;

/// Extracts the lowercase host from an address
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Some(String)` - The lowercase host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use furlong::url::extract_domain;
///
/// let url = Url::parse("https://WWW.SportingLife.com/racing").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.sportinglife.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
