//! Whole-archive JSON export

use crate::output::traits::{OutputError, OutputResult};
use crate::storage::Storage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every archived item to `path` as one JSON array
///
/// Items are ordered newest resolved date first, then newest first-seen;
/// undated items come last.
///
/// # Returns
///
/// The number of items written
pub fn export_json(storage: &dyn Storage, path: &Path) -> OutputResult<usize> {
    let items = storage
        .list_items()
        .map_err(|e| OutputError::Storage(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &items)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!("Exported {} items to {}", items.len(), path.display());
    Ok(items.len())
}
