use serde::Deserialize;

/// Main configuration structure for Furlong
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of entity addresses to discover before stopping
    pub quota: u32,

    /// Wall-clock budget for one crawl session (minutes)
    #[serde(rename = "timeout-mins")]
    pub timeout_mins: f64,

    /// Mean new discoveries per page below which the crawl is saturated
    #[serde(rename = "saturation-threshold", default = "default_saturation_threshold")]
    pub saturation_threshold: f64,

    /// Number of recent pages in the saturation window
    #[serde(rename = "window-size", default = "default_window_size")]
    pub window_size: usize,

    /// Lower bound of the randomized delay between fetches (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay between fetches (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum number of pending addresses kept for resumption
    #[serde(rename = "snapshot-cap", default = "default_snapshot_cap")]
    pub snapshot_cap: usize,

    /// Queue position at which participant links from race pages are inserted
    #[serde(rename = "priority-offset", default = "default_priority_offset")]
    pub priority_offset: usize,

    /// Pages between snapshot checkpoints
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
}

fn default_saturation_threshold() -> f64 {
    0.05
}

fn default_window_size() -> usize {
    200
}

fn default_min_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    500
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_snapshot_cap() -> usize {
    500
}

fn default_priority_offset() -> usize {
    10
}

fn default_checkpoint_interval() -> u64 {
    50
}

/// The site being mapped
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Default seed address
    pub seed: String,

    /// Domain patterns that are in scope (e.g., "*.sportinglife.com")
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,

    /// Path prefixes that navigation links must start with to be followed
    #[serde(rename = "follow-prefixes", default = "default_follow_prefixes")]
    pub follow_prefixes: Vec<String>,
}

fn default_follow_prefixes() -> Vec<String> {
    vec!["/racing/".to_string()]
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
