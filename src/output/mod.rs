//! Output module for archive events, exports and reports
//!
//! This module handles:
//! - The sink interface every acceptance event is fanned out to
//! - A JSON-lines feed of accepted items
//! - Whole-archive JSON export
//! - Archive statistics

mod export;
mod jsonl;
pub mod stats;
mod traits;

pub use export::export_json;
pub use jsonl::JsonLinesSink;
pub use stats::{load_statistics, print_statistics, ChronicleStatistics};
pub use traits::{ArchiveSink, CollectingSink, LogSink, OutputError, OutputResult};

use crate::config::Config;
use std::path::Path;

/// Builds the sinks a configuration asks for
///
/// The log sink is always present; the JSON-lines sink only when
/// `json-lines-path` is set.
pub fn configured_sinks(config: &Config) -> OutputResult<Vec<Box<dyn ArchiveSink>>> {
    let mut sinks: Vec<Box<dyn ArchiveSink>> = vec![Box::new(LogSink)];

    if let Some(path) = &config.output.json_lines_path {
        sinks.push(Box::new(JsonLinesSink::open(Path::new(path))?));
    }

    Ok(sinks)
}
