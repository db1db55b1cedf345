//! Address handling for Furlong
//!
//! Normalization, host matching, classification of racing addresses, and
//! the scope rules that decide which links the crawler may follow.

mod classify;
mod domain;
mod matcher;
mod normalize;

use crate::config::SiteConfig;
use url::Url;

pub use classify::{classify, classify_path};
pub use domain::extract_domain;
pub use matcher::matches_wildcard;
pub use normalize::normalize_url;

/// The entity type an address points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrlKind {
    /// A single race result
    Race,
    /// Horse profile
    Horse,
    /// Jockey profile
    Jockey,
    /// Trainer profile
    Trainer,
    /// Anything that is not a target entity
    Unknown,
}

impl UrlKind {
    /// All target kinds, in reporting order
    pub const ENTITIES: [UrlKind; 4] = [
        UrlKind::Race,
        UrlKind::Horse,
        UrlKind::Jockey,
        UrlKind::Trainer,
    ];

    /// Converts to the string stored in the database
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Race => "races",
            Self::Horse => "horses",
            Self::Jockey => "jockeys",
            Self::Trainer => "trainers",
            Self::Unknown => "unknown",
        }
    }

    /// Parses from a database string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "races" => Some(Self::Race),
            "horses" => Some(Self::Horse),
            "jockeys" => Some(Self::Jockey),
            "trainers" => Some(Self::Trainer),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns true for horse, jockey and trainer profiles
    pub fn is_participant(&self) -> bool {
        matches!(self, Self::Horse | Self::Jockey | Self::Trainer)
    }

    /// Returns true for every kind except `Unknown`
    pub fn is_entity(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for UrlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Structural shape of an address, independent of its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlShape {
    /// A concrete entity page; recorded as a discovery
    Entity,
    /// A date-scoped results listing; followed, never recorded
    Listing,
    /// Any other page on the site
    Navigation,
}

/// Result of classifying an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Classification {
    pub kind: UrlKind,
    pub shape: UrlShape,
}

impl Classification {
    pub const LISTING: Classification = Classification {
        kind: UrlKind::Unknown,
        shape: UrlShape::Listing,
    };

    pub const NAVIGATION: Classification = Classification {
        kind: UrlKind::Unknown,
        shape: UrlShape::Navigation,
    };

    pub const fn entity(kind: UrlKind) -> Self {
        Classification {
            kind,
            shape: UrlShape::Entity,
        }
    }
}

/// Which normalized addresses the crawler is allowed to follow
#[derive(Debug, Clone)]
pub struct CrawlScope {
    allowed_domains: Vec<String>,
    follow_prefixes: Vec<String>,
    /// Scheme, host and port every alias of the crawled site is rewritten to
    canonical_origin: Option<Url>,
}

impl CrawlScope {
    /// Creates a scope from domain patterns and navigation path prefixes
    ///
    /// An empty prefix list lets every navigation path through.
    pub fn new(allowed_domains: Vec<String>, follow_prefixes: Vec<String>) -> Self {
        Self {
            allowed_domains,
            follow_prefixes,
            canonical_origin: None,
        }
    }

    /// Scope from the `[site]` section, canonicalizing onto the seed's origin
    pub fn from_config(site: &SiteConfig) -> Self {
        let scope = Self::new(site.allowed_domains.clone(), site.follow_prefixes.clone());
        match normalize_url(&site.seed) {
            Ok(seed) => scope.with_canonical_origin(&seed),
            Err(_) => scope,
        }
    }

    /// Sets the origin that aliases of the same site are folded onto
    pub fn with_canonical_origin(mut self, origin: &Url) -> Self {
        self.canonical_origin = Some(origin.clone());
        self
    }

    pub fn has_canonical_origin(&self) -> bool {
        self.canonical_origin.is_some()
    }

    /// Rewrites an alias of the canonical site onto the canonical origin
    ///
    /// `http://sportinglife.com/x` and `https://www.sportinglife.com/x` are
    /// the same page and must share one store key. A host is an alias when it
    /// equals the canonical host with or without a leading `www.` and carries
    /// the same explicit port. Other hosts are returned unchanged.
    pub fn canonicalize(&self, url: Url) -> Url {
        let origin = match &self.canonical_origin {
            Some(origin) => origin,
            None => return url,
        };
        let (host, canonical_host) = match (url.host_str(), origin.host_str()) {
            (Some(host), Some(canonical_host)) => (host, canonical_host),
            _ => return url,
        };
        if site_name(host) != site_name(canonical_host) || url.port() != origin.port() {
            return url;
        }
        if url.scheme() == origin.scheme() && host == canonical_host {
            return url;
        }

        let mut canonical = url.clone();
        let rewritten = canonical.set_scheme(origin.scheme()).is_ok()
            && canonical.set_host(Some(canonical_host)).is_ok()
            && canonical.set_port(origin.port()).is_ok();
        if rewritten {
            canonical
        } else {
            url
        }
    }

    /// Returns true if the host is covered by an allowed-domain pattern
    pub fn allows_host(&self, url: &Url) -> bool {
        match extract_domain(url) {
            Some(host) => self
                .allowed_domains
                .iter()
                .any(|pattern| matches_wildcard(pattern, &host)),
            None => false,
        }
    }

    /// Decides whether a classified link should be followed
    ///
    /// Entities and listings only need an allowed host. Navigation links
    /// must also sit under one of the follow prefixes.
    pub fn admits(&self, url: &Url, class: &Classification) -> bool {
        if !self.allows_host(url) {
            return false;
        }

        match class.shape {
            UrlShape::Entity | UrlShape::Listing => true,
            UrlShape::Navigation => {
                self.follow_prefixes.is_empty()
                    || self
                        .follow_prefixes
                        .iter()
                        .any(|prefix| url.path().starts_with(prefix.as_str()))
            }
        }
    }
}

fn site_name(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CrawlScope {
        CrawlScope::new(
            vec!["*.sportinglife.com".to_string()],
            vec!["/racing/".to_string()],
        )
    }

    fn admits(address: &str) -> bool {
        let url = normalize_url(address).unwrap();
        scope().admits(&url, &classify(&url))
    }

    #[test]
    fn test_db_string_roundtrip() {
        for kind in UrlKind::ENTITIES.iter().chain([UrlKind::Unknown].iter()) {
            assert_eq!(UrlKind::from_db_string(kind.to_db_string()), Some(*kind));
        }
        assert_eq!(UrlKind::from_db_string("greyhounds"), None);
    }

    #[test]
    fn test_participants() {
        assert!(!UrlKind::Race.is_participant());
        assert!(UrlKind::Horse.is_participant());
        assert!(UrlKind::Jockey.is_participant());
        assert!(UrlKind::Trainer.is_participant());
        assert!(!UrlKind::Unknown.is_participant());
        assert!(UrlKind::Race.is_entity());
        assert!(!UrlKind::Unknown.is_entity());
    }

    #[test]
    fn test_scope_follows_racing_paths() {
        assert!(admits("https://www.sportinglife.com/racing/fast-results"));
        assert!(admits("https://www.sportinglife.com/racing/profiles/horse/42"));
        assert!(admits("https://sportinglife.com/racing/results/2024-03-02"));
    }

    #[test]
    fn test_scope_rejects_other_sections_and_hosts() {
        assert!(!admits("https://www.sportinglife.com/football/news"));
        assert!(!admits("https://www.sportinglife.com/"));
        assert!(!admits("https://www.racingpost.com/racing/profiles/horse/42"));
    }

    #[test]
    fn test_empty_prefix_list_follows_everything_on_host() {
        let scope = CrawlScope::new(vec!["*.sportinglife.com".to_string()], Vec::new());
        let url = normalize_url("https://www.sportinglife.com/golf").unwrap();
        assert!(scope.admits(&url, &classify(&url)));
    }

    fn canonical_scope() -> CrawlScope {
        let seed = normalize_url("https://www.sportinglife.com/racing/results").unwrap();
        scope().with_canonical_origin(&seed)
    }

    fn canonical(address: &str) -> String {
        canonical_scope()
            .canonicalize(normalize_url(address).unwrap())
            .to_string()
    }

    #[test]
    fn test_site_aliases_share_one_address() {
        let expected = "https://www.sportinglife.com/racing/profiles/horse/1";
        assert_eq!(canonical("http://www.sportinglife.com/racing/profiles/horse/1"), expected);
        assert_eq!(canonical("https://sportinglife.com/racing/profiles/horse/1"), expected);
        assert_eq!(canonical("http://sportinglife.com/racing/profiles/horse/1/"), expected);
        assert_eq!(canonical(expected), expected);
    }

    #[test]
    fn test_other_hosts_are_not_rewritten() {
        assert_eq!(
            canonical("https://news.sportinglife.com/racing/tips"),
            "https://news.sportinglife.com/racing/tips"
        );
        assert_eq!(
            canonical("http://www.racingpost.com/racing/profiles/horse/1"),
            "http://www.racingpost.com/racing/profiles/horse/1"
        );
        assert_eq!(
            canonical("https://www.sportinglife.com:8443/racing"),
            "https://www.sportinglife.com:8443/racing"
        );
    }

    #[test]
    fn test_scope_without_origin_leaves_addresses_alone() {
        let url = normalize_url("http://sportinglife.com/racing").unwrap();
        assert_eq!(scope().canonicalize(url.clone()), url);
        assert!(!scope().has_canonical_origin());
    }
}
