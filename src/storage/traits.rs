//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::UrlStatus;
use crate::storage::{AddressRecord, SessionRecord, StopReason, UpsertOutcome};
use crate::url::UrlKind;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: UrlStatus, to: UrlStatus },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// There is exactly one writer during a crawl, so implementations need no
/// locking beyond what the backend provides.
pub trait Storage {
    // ===== Address Ledger =====

    /// Inserts an address, or moves an existing one forward in the lifecycle
    ///
    /// A row that is already at or beyond the requested status is left
    /// alone, so a stale `Unprocessed` never overwrites `Succeeded`.
    ///
    /// # Arguments
    ///
    /// * `address` - The normalized address
    /// * `kind` - Classification of the address
    /// * `status` - The requested status
    ///
    /// # Returns
    ///
    /// Whether the row was inserted, advanced, or left untouched
    fn upsert(
        &mut self,
        address: &str,
        kind: UrlKind,
        status: UrlStatus,
    ) -> StorageResult<UpsertOutcome>;

    /// Sets the status of an existing address, enforcing the lifecycle
    ///
    /// Returns `StorageError::InvalidTransition` for illegal moves such as
    /// leaving `Succeeded`, and `StorageError::AddressNotFound` if the
    /// address has never been stored.
    fn mark_status(&mut self, address: &str, status: UrlStatus) -> StorageResult<()>;

    /// Gets the status of an address, if it is known
    fn status_of(&self, address: &str) -> StorageResult<Option<UrlStatus>>;

    /// Gets the full row for an address
    fn get_record(&self, address: &str) -> StorageResult<Option<AddressRecord>>;

    /// Stamps `last_accessed` after a fetch attempt
    ///
    /// Addresses not yet in the ledger are inserted as `Unprocessed` with
    /// the given kind.
    fn record_access(&mut self, address: &str, kind: UrlKind) -> StorageResult<()>;

    /// Counts rows grouped by kind and status
    fn counts_by_kind_and_status(&self) -> StorageResult<BTreeMap<(UrlKind, UrlStatus), u64>>;

    /// Loads up to `limit` `Unprocessed` addresses that no crawl has fetched yet
    fn load_unvisited(&self, limit: usize) -> StorageResult<Vec<AddressRecord>>;

    /// Moves every `Failed` address back to `Unprocessed`
    ///
    /// # Returns
    ///
    /// The number of addresses requeued
    fn requeue_failed(&mut self) -> StorageResult<u64>;

    // ===== Session Management =====

    /// Creates a new crawl session
    ///
    /// # Returns
    ///
    /// The ID of the newly created session
    fn create_session(
        &mut self,
        seed_address: &str,
        config_hash: &str,
        resumed: bool,
    ) -> StorageResult<i64>;

    /// Records the end of a session with its final counters
    fn finish_session(
        &mut self,
        session_id: i64,
        stop_reason: StopReason,
        discovered_count: u64,
        pages_visited: u64,
    ) -> StorageResult<()>;

    /// Gets a session by ID
    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord>;

    /// Gets the most recent session
    fn latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    /// Lists the most recent sessions, newest first
    fn list_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>>;

    // ===== Resume Snapshots =====

    /// Replaces a session's pending-address snapshot
    ///
    /// At most `cap` addresses are kept, taken from the front of `addresses`.
    fn save_snapshot(
        &mut self,
        session_id: i64,
        addresses: &[String],
        cap: usize,
    ) -> StorageResult<()>;

    /// Loads the snapshot of the most recent session
    ///
    /// Every crawl session writes a snapshot as soon as it is created, so the
    /// newest session always holds the queue it inherited or left behind.
    fn load_latest_snapshot(&self) -> StorageResult<Vec<String>>;
}
