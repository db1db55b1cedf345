/// Checks if a host matches an allowed-domain pattern
///
/// `"sportinglife.com"` matches only itself. `"*.sportinglife.com"` matches
/// the bare domain and any subdomain beneath it.
///
/// # Examples
///
/// ```
/// use furlong::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.sportinglife.com", "sportinglife.com"));
/// assert!(matches_wildcard("*.sportinglife.com", "www.sportinglife.com"));
/// assert!(!matches_wildcard("sportinglife.com", "www.sportinglife.com"));
/// assert!(!matches_wildcard("*.sportinglife.com", "notsportinglife.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |head| head.ends_with('.'))
        }
        None => candidate == pattern,
    }
}
