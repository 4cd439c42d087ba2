//! Storage module for the identity store
//!
//! This module owns every persistent record:
//! - SQLite database initialization and schema management
//! - Archived items, keyed by the identity digest of their canonical URL
//! - Traversal run records with checkpointed counters
//! - Aggregate queries for statistics and export

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawler::Mode;
use crate::dates::{Confidence, DateStrategy, DateWarning, ResolvedDate};
use crate::state::StopReason;
use crate::url::identity_hash;
use crate::ChronicleError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(ChronicleError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ChronicleError> {
    SqliteStorage::new(path)
}

/// An item about to be offered to the store
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Already canonicalized; identity is derived from it
    pub canonical_url: Url,

    /// The link as found on the page, used whenever the item is fetched
    pub link_url: Url,
    pub title: String,
    pub snippet: String,
    /// Full body text, when the item's own page was fetched
    pub content: Option<String>,
    pub resolved: ResolvedDate,
    /// Which inclusion rule accepted the item (`keyword:<kw>` or `all`)
    pub match_rationale: String,
    pub first_seen_run: Option<i64>,
}

impl NewItem {
    /// The identity digest this item is stored under
    pub fn identity_hash(&self) -> String {
        identity_hash(&self.canonical_url)
    }

    /// Number of whitespace-separated words in the content, if any
    pub fn word_count(&self) -> Option<u32> {
        self.content
            .as_deref()
            .map(|content| u32::try_from(content.split_whitespace().count()).unwrap_or(u32::MAX))
    }
}

/// A persisted archived item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedItem {
    #[serde(skip)]
    pub id: i64,
    pub identity_hash: String,
    pub canonical_url: String,
    pub link_url: String,
    pub title: String,
    pub snippet: String,
    pub content: Option<String>,
    pub word_count: Option<u32>,
    pub resolved_date: Option<NaiveDate>,
    pub resolved_time: Option<NaiveTime>,
    pub date_confidence: Confidence,
    pub date_strategy: DateStrategy,
    pub date_raw: Option<String>,
    pub date_warnings: Vec<DateWarning>,
    pub needs_review: bool,
    pub match_rationale: String,
    pub first_seen_at: String,
    pub last_updated: String,
}

impl ArchivedItem {
    /// Reassembles the stored date fields
    pub fn resolved(&self) -> ResolvedDate {
        ResolvedDate {
            date: self.resolved_date,
            time: self.resolved_time,
            confidence: self.date_confidence,
            strategy: self.date_strategy,
            raw: self.date_raw.clone(),
            warnings: self.date_warnings.clone(),
        }
    }
}

/// Result of offering an item to the store
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// First sighting; the new record is returned
    Accepted(Box<ArchivedItem>),

    /// The identity was already archived; nothing was written
    Duplicate,
}

impl AcceptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Running counters of a traversal, checkpointed into its run record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub pages_visited: u32,
    pub items_seen: u32,
    pub items_accepted: u32,
    pub items_duplicate: u32,
    pub items_filtered: u32,
    pub anomalies: u32,
    pub review_flagged: u32,
}

/// Represents a traversal run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub source_url: String,
    pub mode: Mode,
    pub config_hash: String,
    pub status: RunStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub counters: RunCounters,
    /// Absent while the run is still in progress
    pub stop_reason: Option<StopReason>,
}

/// Status of a traversal run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    /// The status a run is finalized with for a given stop reason
    pub fn for_stop(reason: &StopReason) -> Self {
        match reason {
            StopReason::Cancelled => Self::Interrupted,
            StopReason::FetchError | StopReason::Fatal => Self::Failed,
            _ => Self::Completed,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// End-of-run report handed to reporting collaborators
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub pages_visited: u32,
    pub items_seen: u32,
    pub items_accepted: u32,
    pub items_duplicate: u32,
    pub items_filtered: u32,
    pub anomalies: u32,
    pub review_flagged: u32,
    pub stop_reason: StopReason,
    pub duration: Duration,

    /// Why the run failed, when it ended abnormally
    pub failure: Option<String>,
}

impl RunSummary {
    /// Builds a summary from a run's final counters
    pub fn new(
        run_id: i64,
        mode: Mode,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        counters: RunCounters,
        stop_reason: StopReason,
    ) -> Self {
        Self {
            run_id,
            mode,
            started_at,
            ended_at,
            pages_visited: counters.pages_visited,
            items_seen: counters.items_seen,
            items_accepted: counters.items_accepted,
            items_duplicate: counters.items_duplicate,
            items_filtered: counters.items_filtered,
            anomalies: counters.anomalies,
            review_flagged: counters.review_flagged,
            stop_reason,
            duration: (ended_at - started_at).to_std().unwrap_or_default(),
            failure: None,
        }
    }

    /// Attaches the error that ended the run
    pub fn with_failure(mut self, failure: Option<String>) -> Self {
        self.failure = failure;
        self
    }
}

/// Aggregate archive statistics
#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    pub total_items: u64,
    /// Most reliable level first
    pub by_confidence: Vec<(Confidence, u64)>,
    pub by_strategy: Vec<(DateStrategy, u64)>,
    pub needs_review: u64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub total_words: u64,
}
