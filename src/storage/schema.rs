//! Database schema definitions
//!
//! The `urls` table and its status strings are shared with the results
//! scraper and the reporting tools.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Durable address ledger
CREATE TABLE IF NOT EXISTS urls (
    address TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'unprocessed',
    last_accessed TEXT
);

CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
CREATE INDEX IF NOT EXISTS idx_urls_kind ON urls(kind);

-- One row per crawl session
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_address TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    stop_reason TEXT,
    discovered_count INTEGER NOT NULL DEFAULT 0,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT NOT NULL,
    resumed INTEGER NOT NULL DEFAULT 0
);

-- Bounded frontier snapshot used to resume a session
CREATE TABLE IF NOT EXISTS crawl_state (
    session_id INTEGER NOT NULL REFERENCES crawl_sessions(id),
    position INTEGER NOT NULL,
    address TEXT NOT NULL,
    PRIMARY KEY (session_id, position)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["urls", "crawl_sessions", "crawl_state"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_address_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO urls (address, kind) VALUES ('https://a.example.com/x', 'horses')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO urls (address, kind) VALUES ('https://a.example.com/x', 'races')",
            [],
        );
        assert!(dup.is_err());
    }
}
