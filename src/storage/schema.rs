//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Sumi-Chronicle database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track traversal runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL,
    mode TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    items_seen INTEGER NOT NULL DEFAULT 0,
    items_accepted INTEGER NOT NULL DEFAULT 0,
    items_duplicate INTEGER NOT NULL DEFAULT 0,
    items_filtered INTEGER NOT NULL DEFAULT 0,
    anomalies INTEGER NOT NULL DEFAULT 0,
    review_flagged INTEGER NOT NULL DEFAULT 0,
    stop_reason TEXT,
    stop_detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_source ON runs(source_url, id);

-- Every item ever accepted, keyed by the digest of its canonical URL
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_hash TEXT NOT NULL UNIQUE,
    canonical_url TEXT NOT NULL UNIQUE,
    link_url TEXT,
    title TEXT NOT NULL,
    snippet TEXT NOT NULL DEFAULT '',
    content TEXT,
    word_count INTEGER,
    resolved_date TEXT,
    resolved_time TEXT,
    date_confidence TEXT NOT NULL,
    date_strategy TEXT NOT NULL,
    date_raw TEXT,
    date_warnings TEXT NOT NULL DEFAULT '',
    needs_review INTEGER NOT NULL DEFAULT 0,
    match_rationale TEXT NOT NULL,
    first_seen_run INTEGER REFERENCES runs(id),
    first_seen_at TEXT NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_date ON items(resolved_date);
CREATE INDEX IF NOT EXISTS idx_items_confidence ON items(date_confidence);

-- Identity fields never change once written
CREATE TRIGGER IF NOT EXISTS items_identity_immutable
BEFORE UPDATE OF identity_hash, canonical_url ON items
BEGIN
    SELECT RAISE(ABORT, 'item identity is immutable');
END;
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
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    conn.execute_batch(SCHEMA_SQL)?;

    // Version 1 stored only the canonical form of each item's link
    if version == 1 {
        conn.execute_batch("ALTER TABLE items ADD COLUMN link_url TEXT;")?;
    }

    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    2
}
