//! Crawler module: fetching, link extraction and crawl coordination
//!
//! This module contains the discovery loop, including:
//! - HTTP fetching behind the `PageSource` seam
//! - HTML link extraction
//! - The deduplicated, prioritized frontier
//! - Saturation detection
//! - Session coordination and the background crawl handle

mod coordinator;
mod fetcher;
mod frontier;
mod handle;
mod parser;
mod saturation;

pub use coordinator::{CrawlOptions, CrawlState, Coordinator, SessionReport};
pub use fetcher::{build_http_client, fetch_url, user_agent_string, FetchResult, HttpSource, PageSource};
pub use frontier::{AddressLedger, EnqueueOutcome, Frontier, FrontierEntry};
pub use handle::{start_crawl, CrawlEvent, CrawlHandle};
pub use parser::extract_links;
pub use saturation::SaturationMonitor;

pub use crate::storage::StopReason;
