//! JSON-lines sink
//!
//! Appends one JSON object per accepted item to a file, so repeated runs
//! build a single chronological feed of everything ever archived.

use crate::output::traits::{ArchiveSink, OutputResult};
use crate::storage::ArchivedItem;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes every accepted item as one JSON line
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Opens (or creates) the file for appending
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the JSON-lines file
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }
}

impl ArchiveSink for JsonLinesSink {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn on_accepted(&mut self, item: &ArchivedItem) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer.write_all(b"\n")?;
        // Each line is durable on its own; a crash loses at most the current item
        self.writer.flush()?;
        Ok(())
    }

    fn on_run_finished(&mut self, _summary: &crate::storage::RunSummary) -> OutputResult<()> {
        self.writer.flush()?;
        tracing::debug!("Flushed {}", self.path.display());
        Ok(())
    }
}
