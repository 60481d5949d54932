//! Storage module for the local working directory
//!
//! This module handles the file based page cache:
//! - Query fingerprints used as cache keys
//! - Freshness checks based on file modification time
//! - Exclusive (temp file + rename) writes shared with the usage store

mod cache;
mod error;

pub use cache::{CacheEntry, CacheKey, CacheManager, CachedPage, SearchResult, CACHE_TTL};
pub use error::{StorageError, StorageResult};

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes `bytes` to `path` so that readers never observe a partial file
///
/// The content goes to a sibling temp file which is synced and then renamed
/// over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path).map_err(|e| StorageError::io(&temp_path, e))?;
    file.write_all(bytes)
        .map_err(|e| StorageError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| StorageError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

/// Creates the working directory if it does not exist yet
pub fn ensure_working_dir(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).map_err(|e| StorageError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_ensure_working_dir_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_working_dir(&nested).unwrap();
        ensure_working_dir(&nested).unwrap();

        assert!(nested.is_dir());
    }
}
