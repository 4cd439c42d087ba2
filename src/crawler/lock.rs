//! Advisory per-source run lock
//!
//! At most one traversal per source should run at a time so that progress
//! reporting stays meaningful. Deduplication does not depend on this lock;
//! the identity store's atomic accept is what keeps concurrent runs correct.

use crate::ChronicleError;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Hex digits of the source digest used in the lock file name
const DIGEST_PREFIX_LEN: usize = 12;

/// An exclusive lock held for the duration of a run
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct SourceLock {
    file: File,
    path: PathBuf,
}

impl SourceLock {
    /// The lock file of `source_url` next to `database_path`
    ///
    /// Format: `<database-path>.<source-digest-prefix>.lock`
    pub fn lock_path(database_path: &Path, source_url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(source_url.as_bytes()));
        let mut name = database_path.as_os_str().to_os_string();
        name.push(format!(".{}.lock", &digest[..DIGEST_PREFIX_LEN]));
        PathBuf::from(name)
    }

    /// Takes the lock without waiting
    ///
    /// # Errors
    ///
    /// [`ChronicleError::SourceLocked`] if another process or run holds it.
    pub fn acquire(database_path: &Path, source_url: &str) -> Result<Self, ChronicleError> {
        let path = Self::lock_path(database_path, source_url);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(ChronicleError::SourceLocked {
                    source_url: source_url.to_string(),
                    lock_path: path.display().to_string(),
                });
            }
            return Err(e.into());
        }

        tracing::debug!("Acquired run lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_format() {
        let path = SourceLock::lock_path(Path::new("/data/chronicle.db"), "https://example.com/");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("chronicle.db."));
        assert!(name.ends_with(".lock"));
        assert_eq!(name.len(), "chronicle.db.".len() + DIGEST_PREFIX_LEN + ".lock".len());
    }

    #[test]
    fn test_second_acquire_fails_until_released() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("chronicle.db");

        let held = SourceLock::acquire(&db, "https://example.com/").unwrap();
        let second = SourceLock::acquire(&db, "https://example.com/");
        assert!(matches!(second, Err(ChronicleError::SourceLocked { .. })));

        // Different sources do not contend
        assert!(SourceLock::acquire(&db, "https://other.example.org/").is_ok());

        drop(held);
        assert!(SourceLock::acquire(&db, "https://example.com/").is_ok());
    }
}
