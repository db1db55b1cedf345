//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::UrlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{AddressRecord, SessionRecord, StopReason, UpsertOutcome};
use crate::url::UrlKind;
use crate::FurlongError;
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::BTreeMap;
use std::path::Path;

/// Lifecycle rank of the stored status, mirroring `UrlStatus::rank`
const STATUS_RANK_SQL: &str = "CASE status \
     WHEN 'unprocessed' THEN 0 \
     WHEN 'in_progress' THEN 1 \
     WHEN 'failed' THEN 2 \
     WHEN 'successful' THEN 3 \
     ELSE 0 END";

const SESSION_COLUMNS: &str = "id, seed_address, started_at, ended_at, stop_reason, \
     discovered_count, pages_visited, config_hash, resumed";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and applies the schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(FurlongError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, FurlongError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, FurlongError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AddressRecord> {
    Ok(AddressRecord {
        address: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        last_accessed: row.get(3)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        seed_address: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        stop_reason: row.get(4)?,
        discovered_count: row.get::<_, i64>(5)? as u64,
        pages_visited: row.get::<_, i64>(6)? as u64,
        config_hash: row.get(7)?,
        resumed: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Address Ledger =====

    fn upsert(
        &mut self,
        address: &str,
        kind: UrlKind,
        status: UrlStatus,
    ) -> StorageResult<UpsertOutcome> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO urls (address, kind, status) VALUES (?1, ?2, ?3)",
            params![address, kind, status],
        )?;
        if inserted > 0 {
            return Ok(UpsertOutcome::Inserted);
        }

        // The rank guard lives in SQL so a concurrent writer can never be regressed
        let updated = self.conn.execute(
            &format!(
                "UPDATE urls SET status = ?2 WHERE address = ?1 AND {} < ?3",
                STATUS_RANK_SQL
            ),
            params![address, status, status.rank()],
        )?;

        Ok(if updated > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Unchanged
        })
    }

    fn mark_status(&mut self, address: &str, status: UrlStatus) -> StorageResult<()> {
        let current = self
            .status_of(address)?
            .ok_or_else(|| StorageError::AddressNotFound(address.to_string()))?;

        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        if current != status {
            self.conn.execute(
                "UPDATE urls SET status = ?2 WHERE address = ?1",
                params![address, status],
            )?;
        }

        Ok(())
    }

    fn status_of(&self, address: &str) -> StorageResult<Option<UrlStatus>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM urls WHERE address = ?1",
                params![address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    fn get_record(&self, address: &str) -> StorageResult<Option<AddressRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT address, kind, status, last_accessed FROM urls WHERE address = ?1",
                params![address],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn record_access(&mut self, address: &str, kind: UrlKind) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO urls (address, kind, status, last_accessed) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(address) DO UPDATE SET last_accessed = excluded.last_accessed",
            params![address, kind, UrlStatus::Unprocessed, now],
        )?;
        Ok(())
    }

    fn counts_by_kind_and_status(&self) -> StorageResult<BTreeMap<(UrlKind, UrlStatus), u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, status, COUNT(*) FROM urls GROUP BY kind, status")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, UrlKind>(0)?,
                row.get::<_, UrlStatus>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (kind, status, count) = row?;
            counts.insert((kind, status), count as u64);
        }

        Ok(counts)
    }

    fn load_unvisited(&self, limit: usize) -> StorageResult<Vec<AddressRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT address, kind, status, last_accessed FROM urls
             WHERE status = ?1 AND last_accessed IS NULL
             ORDER BY rowid LIMIT ?2",
        )?;

        let records = stmt
            .query_map(
                params![UrlStatus::Unprocessed, limit as i64],
                record_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn requeue_failed(&mut self) -> StorageResult<u64> {
        let changed = self.conn.execute(
            "UPDATE urls SET status = ?1 WHERE status = ?2",
            params![UrlStatus::Unprocessed, UrlStatus::Failed],
        )?;
        Ok(changed as u64)
    }

    // ===== Session Management =====

    fn create_session(
        &mut self,
        seed_address: &str,
        config_hash: &str,
        resumed: bool,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_sessions (seed_address, started_at, config_hash, resumed)
             VALUES (?1, ?2, ?3, ?4)",
            params![seed_address, now, config_hash, resumed],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_session(
        &mut self,
        session_id: i64,
        stop_reason: StopReason,
        discovered_count: u64,
        pages_visited: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE crawl_sessions
             SET ended_at = ?1, stop_reason = ?2, discovered_count = ?3, pages_visited = ?4
             WHERE id = ?5",
            params![
                now,
                stop_reason,
                discovered_count as i64,
                pages_visited as i64,
                session_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_sessions WHERE id = ?1", SESSION_COLUMNS),
                params![session_id],
                session_from_row,
            )
            .optional()?
            .ok_or(StorageError::SessionNotFound(session_id))
    }

    fn latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        let session = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawl_sessions ORDER BY id DESC LIMIT 1",
                    SESSION_COLUMNS
                ),
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn list_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_sessions ORDER BY id DESC LIMIT ?1",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(params![limit as i64], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    // ===== Resume Snapshots =====

    fn save_snapshot(
        &mut self,
        session_id: i64,
        addresses: &[String],
        cap: usize,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM crawl_state WHERE session_id = ?1",
            params![session_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO crawl_state (session_id, position, address) VALUES (?1, ?2, ?3)",
            )?;
            for (position, address) in addresses.iter().take(cap).enumerate() {
                stmt.execute(params![session_id, position as i64, address])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_latest_snapshot(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT address FROM crawl_state
             WHERE session_id = (SELECT MAX(id) FROM crawl_sessions)
             ORDER BY position",
        )?;

        let addresses = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(addresses)
    }
}

// Column conversions for the enums stored as text

impl ToSql for UrlStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for UrlStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        UrlStatus::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown status '{}'", s).into()))
    }
}

impl ToSql for UrlKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for UrlKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        UrlKind::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown kind '{}'", s).into()))
    }
}

impl ToSql for StopReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for StopReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        StopReason::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown stop reason '{}'", s).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RACE: &str =
        "https://www.sportinglife.com/racing/results/2024-03-02/kempton/812345/novice-hurdle";
    const HORSE: &str = "https://www.sportinglife.com/racing/profiles/horse/4411";
    const NAV: &str = "https://www.sportinglife.com/racing/fast-results";

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[test]
    fn test_upsert_inserts_then_leaves_alone() {
        let mut storage = storage();
        assert_eq!(
            storage
                .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
                .unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            storage
                .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
                .unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            storage.status_of(RACE).unwrap(),
            Some(UrlStatus::Unprocessed)
        );
    }

    #[test]
    fn test_upsert_never_regresses_succeeded() {
        let mut storage = storage();
        storage
            .upsert(HORSE, UrlKind::Horse, UrlStatus::Unprocessed)
            .unwrap();
        storage.mark_status(HORSE, UrlStatus::InProgress).unwrap();
        storage.mark_status(HORSE, UrlStatus::Succeeded).unwrap();

        for status in UrlStatus::all_statuses() {
            assert_eq!(
                storage.upsert(HORSE, UrlKind::Horse, status).unwrap(),
                UpsertOutcome::Unchanged
            );
        }
        assert_eq!(
            storage.status_of(HORSE).unwrap(),
            Some(UrlStatus::Succeeded)
        );
    }

    #[test]
    fn test_upsert_moves_forward() {
        let mut storage = storage();
        storage
            .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
            .unwrap();
        assert_eq!(
            storage.upsert(RACE, UrlKind::Race, UrlStatus::Failed).unwrap(),
            UpsertOutcome::Updated
        );
        // Failed outranks a stale discovery
        assert_eq!(
            storage
                .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
                .unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(storage.status_of(RACE).unwrap(), Some(UrlStatus::Failed));
    }

    #[test]
    fn test_rank_sql_matches_enum() {
        let storage = storage();
        for status in UrlStatus::all_statuses() {
            let rank: i64 = storage
                .conn
                .query_row(
                    &format!("SELECT {} FROM (SELECT ?1 AS status)", STATUS_RANK_SQL),
                    params![status],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(rank, status.rank() as i64, "{:?}", status);
        }
    }

    #[test]
    fn test_mark_status_rejects_leaving_succeeded() {
        let mut storage = storage();
        storage
            .upsert(HORSE, UrlKind::Horse, UrlStatus::InProgress)
            .unwrap();
        storage.mark_status(HORSE, UrlStatus::Succeeded).unwrap();

        let err = storage
            .mark_status(HORSE, UrlStatus::Unprocessed)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidTransition {
                from: UrlStatus::Succeeded,
                to: UrlStatus::Unprocessed
            }
        ));
    }

    #[test]
    fn test_mark_status_retry_and_missing() {
        let mut storage = storage();
        storage.upsert(RACE, UrlKind::Race, UrlStatus::Failed).unwrap();
        storage.mark_status(RACE, UrlStatus::Unprocessed).unwrap();
        assert_eq!(
            storage.status_of(RACE).unwrap(),
            Some(UrlStatus::Unprocessed)
        );

        assert!(matches!(
            storage.mark_status(HORSE, UrlStatus::Failed),
            Err(StorageError::AddressNotFound(_))
        ));
    }

    #[test]
    fn test_record_access_stamps_and_inserts() {
        let mut storage = storage();
        storage
            .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
            .unwrap();
        storage.record_access(RACE, UrlKind::Race).unwrap();
        storage.record_access(NAV, UrlKind::Unknown).unwrap();

        let race = storage.get_record(RACE).unwrap().unwrap();
        assert!(race.last_accessed.is_some());
        assert_eq!(race.kind, UrlKind::Race);
        assert_eq!(race.status, UrlStatus::Unprocessed);

        let nav = storage.get_record(NAV).unwrap().unwrap();
        assert_eq!(nav.kind, UrlKind::Unknown);
        assert!(nav.was_fetched());
    }

    #[test]
    fn test_load_unvisited() {
        let mut storage = storage();
        storage
            .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
            .unwrap();
        storage
            .upsert(HORSE, UrlKind::Horse, UrlStatus::Unprocessed)
            .unwrap();
        storage.record_access(HORSE, UrlKind::Horse).unwrap();
        storage
            .upsert(
                "https://www.sportinglife.com/racing/profiles/jockey/9",
                UrlKind::Jockey,
                UrlStatus::Failed,
            )
            .unwrap();

        let unvisited = storage.load_unvisited(10).unwrap();
        assert_eq!(unvisited.len(), 1);
        assert_eq!(unvisited[0].address, RACE);

        assert!(storage.load_unvisited(0).unwrap().is_empty());
    }

    #[test]
    fn test_requeue_failed() {
        let mut storage = storage();
        storage.upsert(RACE, UrlKind::Race, UrlStatus::Failed).unwrap();
        storage.upsert(HORSE, UrlKind::Horse, UrlStatus::Failed).unwrap();
        storage
            .upsert(
                "https://www.sportinglife.com/racing/profiles/trainer/3",
                UrlKind::Trainer,
                UrlStatus::Unprocessed,
            )
            .unwrap();

        assert_eq!(storage.requeue_failed().unwrap(), 2);
        assert_eq!(
            storage.status_of(HORSE).unwrap(),
            Some(UrlStatus::Unprocessed)
        );
        assert_eq!(storage.requeue_failed().unwrap(), 0);
    }

    #[test]
    fn test_counts_by_kind_and_status() {
        let mut storage = storage();
        storage
            .upsert(RACE, UrlKind::Race, UrlStatus::Unprocessed)
            .unwrap();
        storage
            .upsert(
                "https://www.sportinglife.com/racing/results/2024-03-02/kempton/812346/chase",
                UrlKind::Race,
                UrlStatus::Unprocessed,
            )
            .unwrap();
        storage.upsert(HORSE, UrlKind::Horse, UrlStatus::Failed).unwrap();

        let counts = storage.counts_by_kind_and_status().unwrap();
        assert_eq!(counts.get(&(UrlKind::Race, UrlStatus::Unprocessed)), Some(&2));
        assert_eq!(counts.get(&(UrlKind::Horse, UrlStatus::Failed)), Some(&1));
        assert_eq!(counts.get(&(UrlKind::Jockey, UrlStatus::Unprocessed)), None);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut storage = storage();
        assert!(storage.latest_session().unwrap().is_none());

        let first = storage.create_session(NAV, "hash-a", false).unwrap();
        let second = storage.create_session(NAV, "hash-a", true).unwrap();
        assert!(second > first);

        storage
            .finish_session(first, StopReason::UserCancelled, 7, 40)
            .unwrap();

        let record = storage.get_session(first).unwrap();
        assert_eq!(record.stop_reason, Some(StopReason::UserCancelled));
        assert_eq!(record.discovered_count, 7);
        assert_eq!(record.pages_visited, 40);
        assert!(record.ended_at.is_some());
        assert!(!record.resumed);

        let latest = storage.latest_session().unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert!(latest.resumed);
        assert!(latest.stop_reason.is_none());

        let listed = storage.list_sessions(10).unwrap();
        assert_eq!(
            listed.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![second, first]
        );

        assert!(matches!(
            storage.finish_session(99, StopReason::Exhausted, 0, 0),
            Err(StorageError::SessionNotFound(99))
        ));
    }

    #[test]
    fn test_snapshot_is_capped_and_replaced() {
        let mut storage = storage();
        let session = storage.create_session(NAV, "hash", false).unwrap();

        let pending: Vec<String> = (0..10)
            .map(|i| format!("https://www.sportinglife.com/racing/profiles/horse/{}", i))
            .collect();
        storage.save_snapshot(session, &pending, 4).unwrap();
        assert_eq!(storage.load_latest_snapshot().unwrap(), pending[..4].to_vec());

        storage.save_snapshot(session, &pending[8..], 4).unwrap();
        assert_eq!(storage.load_latest_snapshot().unwrap(), pending[8..].to_vec());
    }

    #[test]
    fn test_snapshot_comes_from_latest_session_only() {
        let mut storage = storage();
        let old = storage.create_session(NAV, "hash", false).unwrap();
        storage
            .save_snapshot(old, &[HORSE.to_string()], 500)
            .unwrap();

        let newer = storage.create_session(NAV, "hash", false).unwrap();
        storage.save_snapshot(newer, &[], 500).unwrap();

        assert!(storage.load_latest_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage
                .upsert(HORSE, UrlKind::Horse, UrlStatus::Unprocessed)
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(
            storage.status_of(HORSE).unwrap(),
            Some(UrlStatus::Unprocessed)
        );
    }
}
