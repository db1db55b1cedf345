//! Storage module for the durable address ledger
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The `urls` table: one row per address with its kind and lifecycle status
//! - Crawl session records and their bounded resume snapshots

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::UrlStatus;
use crate::url::UrlKind;
use crate::FurlongError;

use std::path::Path;

/// Opens (or creates) the ledger database at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(FurlongError)` - Failed to open the database or apply the schema
pub fn open_storage(path: &Path) -> Result<SqliteStorage, FurlongError> {
    SqliteStorage::new(path)
}

/// One row of the `urls` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: String,
    pub kind: UrlKind,
    pub status: UrlStatus,
    /// RFC 3339 timestamp of the last fetch attempt
    pub last_accessed: Option<String>,
}

impl AddressRecord {
    /// Returns true if a crawl has fetched this address and the fetch did not fail
    pub fn was_fetched(&self) -> bool {
        self.last_accessed.is_some() && self.status != UrlStatus::Failed
    }
}

/// What an upsert did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created
    Inserted,
    /// An existing row moved forward in the lifecycle
    Updated,
    /// An existing row was already as far along (or further)
    Unchanged,
}

/// Represents one crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub seed_address: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub stop_reason: Option<StopReason>,
    pub discovered_count: u64,
    pub pages_visited: u64,
    pub config_hash: String,
    pub resumed: bool,
}

/// Why a crawl session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Timeout,
    QuotaReached,
    SaturationReached,
    UserCancelled,
    Exhausted,
}

impl StopReason {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::QuotaReached => "max_urls_reached",
            Self::SaturationReached => "saturation_reached",
            Self::UserCancelled => "user_stopped",
            Self::Exhausted => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "max_urls_reached" => Some(Self::QuotaReached),
            "saturation_reached" => Some(Self::SaturationReached),
            "user_stopped" => Some(Self::UserCancelled),
            "completed" => Some(Self::Exhausted),
            _ => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "deadline elapsed",
            Self::QuotaReached => "discovery quota reached",
            Self::SaturationReached => "discovery rate saturated",
            Self::UserCancelled => "cancelled by user",
            Self::Exhausted => "frontier exhausted",
        };
        f.write_str(label)
    }
}
