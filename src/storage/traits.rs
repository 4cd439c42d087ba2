//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::Mode;
use crate::dates::ResolvedDate;
use crate::state::StopReason;
use crate::storage::{AcceptOutcome, ArchiveStats, ArchivedItem, NewItem, RunCounters, RunRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Identity conflict for {url}: stored as {existing_url} with hash {identity_hash}")]
    IdentityConflict {
        url: String,
        existing_url: String,
        identity_hash: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The store is the single writer of archived items and run records. Every
/// accept is atomic with respect to other connections to the same database,
/// so independent runs over overlapping pages never both accept an item.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run record in the `running` state
    ///
    /// # Arguments
    ///
    /// * `source_url` - The source's newest page URL
    /// * `mode` - The run's operating mode
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn begin_run(&mut self, source_url: &str, mode: Mode, config_hash: &str)
        -> StorageResult<i64>;

    /// Writes the running counters into the run record
    fn checkpoint_run(&mut self, run_id: i64, counters: &RunCounters) -> StorageResult<()>;

    /// Finalizes a run with its counters and stop reason
    fn finish_run(
        &mut self,
        run_id: i64,
        counters: &RunCounters,
        stop_reason: StopReason,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent finalized run for a source
    fn latest_finished_run(&self, source_url: &str) -> StorageResult<Option<RunRecord>>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    // ===== Identity Store =====

    /// Accepts an item unless its identity is already archived
    ///
    /// Check and insert happen in one transaction. An existing record is
    /// never modified.
    ///
    /// # Errors
    ///
    /// [`StorageError::IdentityConflict`] when the digest matches a record with
    /// a different canonical URL, or the other way round.
    fn try_accept(&mut self, item: &NewItem) -> StorageResult<AcceptOutcome>;

    /// Returns true if an item with this identity digest is archived
    fn contains(&self, identity_hash: &str) -> StorageResult<bool>;

    /// Gets an archived item by identity digest
    fn get_item(&self, identity_hash: &str) -> StorageResult<Option<ArchivedItem>>;

    /// Replaces the date fields of an archived item
    ///
    /// Identity fields are untouched. Returns false if no such item exists.
    fn refresh_date(&mut self, identity_hash: &str, resolved: &ResolvedDate)
        -> StorageResult<bool>;

    /// Items whose date confidence is `low` or `unknown`
    fn items_for_re_resolve(&self) -> StorageResult<Vec<ArchivedItem>>;

    /// Every archived item, newest resolved date first, then newest first-seen
    fn list_items(&self) -> StorageResult<Vec<ArchivedItem>>;

    // ===== Statistics =====

    /// Gets the total archived item count
    fn count_items(&self) -> StorageResult<u64>;

    /// Gets aggregate archive statistics
    fn archive_stats(&self) -> StorageResult<ArchiveStats>;
}
