//! Statistics generation from the archive database
//!
//! This module provides functionality for extracting and displaying
//! archive statistics and recent run history from the storage layer.

use crate::storage::{ArchiveStats, RunRecord, Storage};
use crate::ChronicleError;

/// Number of recent runs shown by `--stats`
pub const RECENT_RUNS: usize = 5;

/// Archive statistics summary
#[derive(Debug, Clone)]
pub struct ChronicleStatistics {
    pub archive: ArchiveStats,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ChronicleStatistics)` - Successfully loaded statistics
/// * `Err(ChronicleError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<ChronicleStatistics, ChronicleError> {
    Ok(ChronicleStatistics {
        archive: storage.archive_stats()?,
        recent_runs: storage.recent_runs(RECENT_RUNS)?,
    })
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &ChronicleStatistics) {
    let archive = &stats.archive;
    println!("=== Archive Statistics ===\n");

    println!("Overview:");
    println!("  Archived items: {}", archive.total_items);
    println!("  Total words: {}", archive.total_words);
    match (archive.earliest_date, archive.latest_date) {
        (Some(earliest), Some(latest)) => println!("  Date range: {} to {}", earliest, latest),
        _ => println!("  Date range: none resolved"),
    }
    println!();

    println!("Date Confidence:");
    for (level, count) in &archive.by_confidence {
        println!(
            "  {}: {} ({:.1}%)",
            level,
            count,
            percentage(*count, archive.total_items)
        );
    }
    println!();

    println!("Date Strategy:");
    let mut strategies: Vec<_> = archive.by_strategy.iter().collect();
    strategies.sort_by(|a, b| b.1.cmp(&a.1));
    for (strategy, count) in strategies {
        println!("  {}: {}", strategy, count);
    }
    println!();

    println!(
        "Needs Review: {} ({:.1}%)",
        archive.needs_review,
        percentage(archive.needs_review, archive.total_items)
    );
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            let stop = run
                .stop_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "in progress".to_string());
            println!(
                "  #{} {} {} [{}]: {} pages, {} accepted, {} duplicate ({})",
                run.id,
                run.started_at,
                run.mode,
                run.status.to_db_string(),
                run.counters.pages_visited,
                run.counters.items_accepted,
                run.counters.items_duplicate,
                stop
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::Mode;
    use crate::state::StopReason;
    use crate::storage::{RunCounters, SqliteStorage};

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert!((percentage(1, 4) - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage
            .begin_run("https://example.com/", Mode::FullHistorical, "hash")
            .unwrap();
        storage
            .finish_run(run, &RunCounters::default(), StopReason::PageLimitReached)
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.archive.total_items, 0);
        assert_eq!(stats.recent_runs.len(), 1);
        assert_eq!(
            stats.recent_runs[0].stop_reason,
            Some(StopReason::PageLimitReached)
        );

        print_statistics(&stats);
    }
}
