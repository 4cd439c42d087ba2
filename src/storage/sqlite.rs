//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::Mode;
use crate::dates::{Confidence, DateStrategy, DateWarning, ResolvedDate};
use crate::state::StopReason;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AcceptOutcome, ArchiveStats, ArchivedItem, NewItem, RunCounters, RunRecord, RunStatus,
};
use crate::ChronicleError;
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another connection's write transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const ITEM_COLUMNS: &str = "id, identity_hash, canonical_url, title, snippet, content, word_count,
     resolved_date, resolved_time, date_confidence, date_strategy, date_raw, date_warnings,
     needs_review, match_rationale, first_seen_at, last_updated,
     COALESCE(link_url, canonical_url)";

const RUN_COLUMNS: &str = "id, source_url, mode, config_hash, status, started_at, ended_at,
     pages_visited, items_seen, items_accepted, items_duplicate, items_filtered, anomalies,
     review_flagged, stop_reason, stop_detail";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// Several instances may open the same file at once (for example a
    /// scheduled incremental run alongside a manual historical run); writers
    /// wait on each other through SQLite's busy timeout.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ChronicleError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ChronicleError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ChronicleError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ArchivedItem> {
    let resolved_date: Option<String> = row.get(7)?;
    let resolved_time: Option<String> = row.get(8)?;
    let warnings: String = row.get(12)?;

    Ok(ArchivedItem {
        id: row.get(0)?,
        identity_hash: row.get(1)?,
        canonical_url: row.get(2)?,
        title: row.get(3)?,
        snippet: row.get(4)?,
        content: row.get(5)?,
        word_count: row.get(6)?,
        resolved_date: resolved_date
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        resolved_time: resolved_time
            .and_then(|s| NaiveTime::parse_from_str(&s, TIME_FORMAT).ok()),
        date_confidence: Confidence::from_db_string(&row.get::<_, String>(9)?)
            .unwrap_or(Confidence::Unknown),
        date_strategy: DateStrategy::from_db_string(&row.get::<_, String>(10)?)
            .unwrap_or(DateStrategy::None),
        date_raw: row.get(11)?,
        date_warnings: DateWarning::split(&warnings),
        needs_review: row.get(13)?,
        match_rationale: row.get(14)?,
        first_seen_at: row.get(15)?,
        last_updated: row.get(16)?,
        link_url: row.get(17)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let stop_reason: Option<String> = row.get(14)?;
    let stop_detail: Option<String> = row.get(15)?;

    Ok(RunRecord {
        id: row.get(0)?,
        source_url: row.get(1)?,
        mode: Mode::from_db_string(&row.get::<_, String>(2)?).unwrap_or_default(),
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
        counters: RunCounters {
            pages_visited: row.get(7)?,
            items_seen: row.get(8)?,
            items_accepted: row.get(9)?,
            items_duplicate: row.get(10)?,
            items_filtered: row.get(11)?,
            anomalies: row.get(12)?,
            review_flagged: row.get(13)?,
        },
        stop_reason: stop_reason
            .as_deref()
            .and_then(|reason| StopReason::from_db_parts(reason, stop_detail.as_deref())),
    })
}

fn date_columns(resolved: &ResolvedDate) -> (Option<String>, Option<String>, String) {
    (
        resolved.date.map(|d| d.format(DATE_FORMAT).to_string()),
        resolved.time.map(|t| t.format(TIME_FORMAT).to_string()),
        DateWarning::join(&resolved.warnings),
    )
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn begin_run(
        &mut self,
        source_url: &str,
        mode: Mode,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (source_url, mode, config_hash, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source_url,
                mode.to_db_string(),
                config_hash,
                RunStatus::Running.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn checkpoint_run(&mut self, run_id: i64, counters: &RunCounters) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET pages_visited = ?1, items_seen = ?2, items_accepted = ?3,
             items_duplicate = ?4, items_filtered = ?5, anomalies = ?6, review_flagged = ?7
             WHERE id = ?8",
            params![
                counters.pages_visited,
                counters.items_seen,
                counters.items_accepted,
                counters.items_duplicate,
                counters.items_filtered,
                counters.anomalies,
                counters.review_flagged,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        counters: &RunCounters,
        stop_reason: StopReason,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, ended_at = ?2, pages_visited = ?3, items_seen = ?4,
             items_accepted = ?5, items_duplicate = ?6, items_filtered = ?7, anomalies = ?8,
             review_flagged = ?9, stop_reason = ?10, stop_detail = ?11
             WHERE id = ?12",
            params![
                RunStatus::for_stop(&stop_reason).to_db_string(),
                now,
                counters.pages_visited,
                counters.items_seen,
                counters.items_accepted,
                counters.items_duplicate,
                counters.items_filtered,
                counters.anomalies,
                counters.review_flagged,
                stop_reason.to_db_string(),
                stop_reason.detail(),
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_finished_run(&self, source_url: &str) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM runs WHERE source_url = ?1 AND stop_reason IS NOT NULL
                     ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![source_url],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    // ===== Identity Store =====

    fn try_accept(&mut self, item: &NewItem) -> StorageResult<AcceptOutcome> {
        let hash = item.identity_hash();
        let url = item.canonical_url.as_str();

        // IMMEDIATE takes the write lock up front, so check and insert cannot
        // interleave with another connection's accept
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT identity_hash, canonical_url FROM items
                 WHERE identity_hash = ?1 OR canonical_url = ?2",
            )?;
            let rows = stmt.query_map(params![hash, url], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        if let Some((existing_hash, existing_url)) = existing
            .iter()
            .find(|(existing_hash, existing_url)| existing_hash != &hash || existing_url != url)
        {
            return Err(StorageError::IdentityConflict {
                url: url.to_string(),
                existing_url: existing_url.clone(),
                identity_hash: existing_hash.clone(),
            });
        }

        if !existing.is_empty() {
            return Ok(AcceptOutcome::Duplicate);
        }

        let now = Utc::now().to_rfc3339();
        let (resolved_date, resolved_time, warnings) = date_columns(&item.resolved);
        let word_count = item.word_count();
        let needs_review = item.resolved.needs_review();

        let inserted = tx.execute(
            "INSERT INTO items (identity_hash, canonical_url, title, snippet, content, word_count,
             resolved_date, resolved_time, date_confidence, date_strategy, date_raw, date_warnings,
             needs_review, match_rationale, first_seen_run, first_seen_at, last_updated, link_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16, ?17)",
            params![
                hash,
                url,
                item.title,
                item.snippet,
                item.content,
                word_count,
                resolved_date,
                resolved_time,
                item.resolved.confidence.to_db_string(),
                item.resolved.strategy.to_db_string(),
                item.resolved.raw,
                warnings,
                needs_review,
                item.match_rationale,
                item.first_seen_run,
                now,
                item.link_url.as_str()
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                tracing::warn!("Lost insert race for {}; treating as duplicate", url);
                return Ok(AcceptOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(AcceptOutcome::Accepted(Box::new(ArchivedItem {
            id,
            identity_hash: hash,
            canonical_url: url.to_string(),
            link_url: item.link_url.to_string(),
            title: item.title.clone(),
            snippet: item.snippet.clone(),
            content: item.content.clone(),
            word_count,
            resolved_date: item.resolved.date,
            resolved_time: item.resolved.time,
            date_confidence: item.resolved.confidence,
            date_strategy: item.resolved.strategy,
            date_raw: item.resolved.raw.clone(),
            date_warnings: item.resolved.warnings.clone(),
            needs_review,
            match_rationale: item.match_rationale.clone(),
            first_seen_at: now.clone(),
            last_updated: now,
        })))
    }

    fn contains(&self, identity_hash: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM items WHERE identity_hash = ?1",
                params![identity_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_item(&self, identity_hash: &str) -> StorageResult<Option<ArchivedItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {} FROM items WHERE identity_hash = ?1", ITEM_COLUMNS),
                params![identity_hash],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn refresh_date(
        &mut self,
        identity_hash: &str,
        resolved: &ResolvedDate,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let (resolved_date, resolved_time, warnings) = date_columns(resolved);

        let updated = self.conn.execute(
            "UPDATE items SET resolved_date = ?1, resolved_time = ?2, date_confidence = ?3,
             date_strategy = ?4, date_raw = ?5, date_warnings = ?6, needs_review = ?7,
             last_updated = ?8
             WHERE identity_hash = ?9",
            params![
                resolved_date,
                resolved_time,
                resolved.confidence.to_db_string(),
                resolved.strategy.to_db_string(),
                resolved.raw,
                warnings,
                resolved.needs_review(),
                now,
                identity_hash
            ],
        )?;

        Ok(updated > 0)
    }

    fn items_for_re_resolve(&self) -> StorageResult<Vec<ArchivedItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items WHERE date_confidence IN (?1, ?2) ORDER BY id",
            ITEM_COLUMNS
        ))?;

        let items = stmt
            .query_map(
                params![
                    Confidence::Low.to_db_string(),
                    Confidence::Unknown.to_db_string()
                ],
                item_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn list_items(&self) -> StorageResult<Vec<ArchivedItem>> {
        // NULL dates sort last under DESC in SQLite
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items ORDER BY resolved_date DESC, first_seen_at DESC, id DESC",
            ITEM_COLUMNS
        ))?;

        let items = stmt
            .query_map([], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    // ===== Statistics =====

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn archive_stats(&self) -> StorageResult<ArchiveStats> {
        let total_items = self.count_items()?;

        let mut confidence_counts = Vec::new();
        for level in Confidence::all_levels() {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM items WHERE date_confidence = ?1",
                params![level.to_db_string()],
                |row| row.get(0),
            )?;
            confidence_counts.push((level, count as u64));
        }

        let mut stmt = self.conn.prepare(
            "SELECT date_strategy, COUNT(*) FROM items
             GROUP BY date_strategy ORDER BY COUNT(*) DESC, date_strategy",
        )?;
        let by_strategy = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(|row| row.ok())
            .filter_map(|(strategy, count)| {
                DateStrategy::from_db_string(&strategy).map(|s| (s, count as u64))
            })
            .collect();

        let needs_review: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE needs_review = 1",
            [],
            |row| row.get(0),
        )?;

        let (earliest, latest, total_words): (Option<String>, Option<String>, Option<i64>) =
            self.conn.query_row(
                "SELECT MIN(resolved_date), MAX(resolved_date), SUM(word_count) FROM items",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let parse = |s: Option<String>| s.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok());

        Ok(ArchiveStats {
            total_items,
            by_confidence: confidence_counts,
            by_strategy,
            needs_review: needs_review as u64,
            earliest_date: parse(earliest),
            latest_date: parse(latest),
            total_words: total_words.unwrap_or(0) as u64,
        })
    }
}
