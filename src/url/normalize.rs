use crate::UrlError;
use url::Url;

/// Query parameters that only carry campaign tracking and never change page content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source", "_ga"];

/// Normalizes an address into the canonical form used as the store key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject anything that is not HTTP(S) with a host
/// 2. Lowercase the host
/// 3. Collapse empty and dot segments in the path
/// 4. Drop the trailing slash (the root path stays `/`)
/// 5. Drop the fragment
/// 6. Drop tracking query parameters and sort the rest by key
///
/// Scheme and `www.` aliases are left alone here. `CrawlScope::canonicalize`
/// folds them onto the crawled site's origin, since only the scope knows
/// which site that is.
///
/// # Arguments
///
/// * `url_str` - The absolute address to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - The address cannot be parsed or has an unsupported shape
///
/// # Examples
///
/// ```
/// use furlong::url::normalize_url;
///
/// let url = normalize_url("https://WWW.SportingLife.com/racing/results/2024-03-02/#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.sportinglife.com/racing/results/2024-03-02");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Removes empty and dot segments and any trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
