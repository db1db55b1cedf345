//! Configuration module for Furlong
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use furlong::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("furlong.toml")).unwrap();
//! println!("Discovery quota: {}", config.crawler.quota);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

/// Re-checks a config after command-line overrides
pub use validation::validate;
