//! File based result page cache
//!
//! One file per query fingerprint. Freshness is derived from the file
//! modification time, not from the payload, so an entry can be expired by
//! touching or copying the file.

use crate::config::{Locale, PageSize};
use crate::storage::{write_atomic, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How long a cached page is used without forcing
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One organic entry on a result page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub host: String,
    pub description: String,
}

/// A processed result page as persisted in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub results: Vec<SearchResult>,
    pub page_index: u32,
    pub has_next_page: bool,
    pub keyword: String,
    pub country: String,
    pub language: String,
    pub result_count: usize,
}

/// A cache hit together with the time it was stored
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub entry: CacheEntry,
    pub stored_at: DateTime<Utc>,
}

/// Fingerprint of a result page request
///
/// Two requests with the same query, locale, page and page size always map
/// to the same key, in any process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(query: &str, locale: &Locale, page_index: u32, page_size: PageSize) -> Self {
        let mut material = format!(
            "{}_{}_{}.{}",
            normalize_query(query),
            locale.language,
            locale.country,
            page_index
        );
        if page_size == PageSize::Hundred {
            material.push_str(".100p");
        }

        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a keyword into the form sent to the search engine
///
/// Surrounding whitespace is dropped, inner runs collapse to one space, and
/// the result is form-urlencoded.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    url::form_urlencoded::byte_serialize(collapsed.as_bytes()).collect()
}

/// Reads and writes cached result pages in the working directory
#[derive(Debug, Clone)]
pub struct CacheManager {
    dir: PathBuf,
}

impl CacheManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.cache", key))
    }

    /// Loads a cached page
    ///
    /// # Arguments
    ///
    /// * `key` - The page fingerprint
    /// * `force_read` - Accept the entry even when it is older than 24 hours
    /// * `bypass_all` - Never read; always a miss
    ///
    /// # Returns
    ///
    /// * `Ok(Some(CachedPage))` - A usable entry
    /// * `Ok(None)` - Miss (absent, expired, bypassed or unreadable)
    /// * `Err(StorageError)` - The cache directory could not be inspected
    pub fn load(
        &self,
        key: &CacheKey,
        force_read: bool,
        bypass_all: bool,
    ) -> StorageResult<Option<CachedPage>> {
        self.load_at(key, force_read, bypass_all, SystemTime::now())
    }

    /// Same as [`CacheManager::load`] with an explicit clock
    pub fn load_at(
        &self,
        key: &CacheKey,
        force_read: bool,
        bypass_all: bool,
        now: SystemTime,
    ) -> StorageResult<Option<CachedPage>> {
        if bypass_all {
            return Ok(None);
        }

        let path = self.path_for(key);
        let Some(modified) = modified_time(&path)? else {
            return Ok(None);
        };

        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if !force_read && age >= CACHE_TTL {
            tracing::debug!("Cache: {} expired ({} hours old)", path.display(), age.as_secs() / 3600);
            return Ok(None);
        }

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Cache: failed to read {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cache: ignoring unreadable entry {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        tracing::debug!(
            "Cache: loaded {} for '{}' page {} (age: {} hours)",
            path.display(),
            entry.keyword,
            entry.page_index,
            age.as_secs() / 3600
        );

        Ok(Some(CachedPage {
            entry,
            stored_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Stores a page, replacing any previous entry for the key
    pub fn store(&self, key: &CacheKey, entry: &CacheEntry) -> StorageResult<()> {
        self.store_at(key, entry, SystemTime::now())
    }

    /// Same as [`CacheManager::store`] with an explicit clock for the
    /// freshness check on the previous entry
    pub fn store_at(&self, key: &CacheKey, entry: &CacheEntry, now: SystemTime) -> StorageResult<()> {
        let path = self.path_for(key);

        if let Some(modified) = modified_time(&path)? {
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < CACHE_TTL {
                tracing::warn!(
                    "Cache: storing '{}' page {} which was already cached within the past 24 hours",
                    entry.keyword,
                    entry.page_index
                );
            }
        }

        let payload = serde_json::to_vec(entry)?;
        write_atomic(&path, &payload)?;

        tracing::debug!(
            "Cache: stored {} for '{}' page {}",
            path.display(),
            entry.keyword,
            entry.page_index
        );
        Ok(())
    }
}

/// Returns the modification time of `path`, or `None` if it does not exist
fn modified_time(path: &Path) -> StorageResult<Option<SystemTime>> {
    match std::fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .map_err(|e| StorageError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
