//! Sink traits and error types
//!
//! Sinks are the independent consumers of acceptance events. The traversal
//! hands each newly accepted item to every sink in order, and the run summary
//! to every sink once the run is finalized.

use crate::storage::{ArchivedItem, RunSummary};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Consumer of archive events
///
/// A sink failure is logged by the traversal and never undoes the accept
/// that produced the event: the identity store stays the source of truth.
pub trait ArchiveSink: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Called once for every newly accepted item, in acceptance order
    ///
    /// # Arguments
    ///
    /// * `item` - The record exactly as it was persisted
    fn on_accepted(&mut self, item: &ArchivedItem) -> OutputResult<()>;

    /// Called once after the run record has been finalized
    ///
    /// # Arguments
    ///
    /// * `summary` - Counts, stop reason and duration of the run
    fn on_run_finished(&mut self, summary: &RunSummary) -> OutputResult<()> {
        let _ = summary;
        Ok(())
    }
}

/// Sink that keeps every event in memory
///
/// Clones share the same buffers, so a clone kept by the caller sees what
/// the traversal's copy received.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    accepted: Arc<Mutex<Vec<ArchivedItem>>>,
    summaries: Arc<Mutex<Vec<RunSummary>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted item received so far
    pub fn accepted(&self) -> Vec<ArchivedItem> {
        self.accepted.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Every run summary received so far
    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ArchiveSink for CollectingSink {
    fn name(&self) -> &str {
        "collect"
    }

    fn on_accepted(&mut self, item: &ArchivedItem) -> OutputResult<()> {
        self.accepted
            .lock()
            .map_err(|_| OutputError::Write("collector lock poisoned".to_string()))?
            .push(item.clone());
        Ok(())
    }

    fn on_run_finished(&mut self, summary: &RunSummary) -> OutputResult<()> {
        self.summaries
            .lock()
            .map_err(|_| OutputError::Write("collector lock poisoned".to_string()))?
            .push(summary.clone());
        Ok(())
    }
}

/// Sink that logs every event at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl ArchiveSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn on_accepted(&mut self, item: &ArchivedItem) -> OutputResult<()> {
        let date = item
            .resolved_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        tracing::info!(
            "Archived: {} [{} {} via {}]",
            item.title,
            date,
            item.date_confidence,
            item.date_strategy
        );
        Ok(())
    }

    fn on_run_finished(&mut self, summary: &RunSummary) -> OutputResult<()> {
        tracing::info!(
            "Run {} ({}) finished: {}, {} pages, {} accepted, {} duplicate, {} filtered, {} anomalies, {} for review in {:.1}s",
            summary.run_id,
            summary.mode,
            summary.stop_reason,
            summary.pages_visited,
            summary.items_accepted,
            summary.items_duplicate,
            summary.items_filtered,
            summary.anomalies,
            summary.review_flagged,
            summary.duration.as_secs_f64()
        );
        Ok(())
    }
}
