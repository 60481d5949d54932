//! Per-identity usage tracking and cooldown enforcement
//!
//! The search engine tolerates roughly 20 requests per hour from one
//! address. Every use of an identity is recorded against its external
//! address in a store that survives restarts; the store is never pruned.

use crate::state::OutboundIdentity;
use crate::storage::{write_atomic, StorageError, StorageResult};
use crate::RankError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of recent uses tracked per identity
pub const USAGE_WINDOW: usize = 20;

/// Time the oldest tracked use must lie in the past before a full window
/// may be used again
pub const COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// File name of the usage store inside the working directory
pub const USAGE_FILE: &str = "ipdata.json";

/// Usage history of one external address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub last_used_at: DateTime<Utc>,
    pub total_requests: u64,
    /// Most recent first, at most [`USAGE_WINDOW`] entries
    pub recent: VecDeque<DateTime<Utc>>,
}

impl UsageRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_used_at: now,
            total_requests: 0,
            recent: VecDeque::with_capacity(USAGE_WINDOW),
        }
    }

    /// Records one use at `now`, shifting older uses down the window
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_used_at = now;
        self.total_requests += 1;
        self.recent.push_front(now);
        self.recent.truncate(USAGE_WINDOW);
    }

    /// Decides whether the identity may be used at `now`
    pub fn verdict(&self, now: DateTime<Utc>) -> UsageVerdict {
        let Some(oldest) = self.recent.get(USAGE_WINDOW - 1) else {
            return UsageVerdict::Ready;
        };

        let elapsed = now.signed_duration_since(*oldest);
        let cooldown = chrono::Duration::seconds(COOLDOWN.as_secs() as i64);
        if elapsed > cooldown {
            UsageVerdict::Ready
        } else {
            let remaining = (cooldown - elapsed).to_std().unwrap_or(Duration::ZERO);
            UsageVerdict::Cooldown { remaining }
        }
    }
}

/// Outcome of a usability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageVerdict {
    /// The identity can be used now
    Ready,
    /// The identity was used too often and needs to rest
    Cooldown { remaining: Duration },
    /// The identity has not finished starting up
    NotReady,
}

impl UsageVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Tracks identity usage and blocks overuse
///
/// The store is loaded once, on the first check, and rewritten in full after
/// every recorded use. Two processes sharing a working directory will
/// overwrite each other's records.
#[derive(Debug)]
pub struct IdentityRateLimiter {
    path: PathBuf,
    records: Option<BTreeMap<String, UsageRecord>>,
}

impl IdentityRateLimiter {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            path: working_dir.join(USAGE_FILE),
            records: None,
        }
    }

    /// Loads the usage store unless it is already loaded
    ///
    /// A missing store starts empty with a warning; a store that cannot be
    /// decoded is an error.
    pub fn load(&mut self) -> StorageResult<()> {
        if self.records.is_some() {
            return Ok(());
        }

        let records = match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Identity usage store {} was not found. If this is the first run everything \
                     is alright; otherwise losing the usage data WILL damage the quality of the \
                     identity pool.",
                    self.path.display()
                );
                BTreeMap::new()
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        self.records = Some(records);
        Ok(())
    }

    /// Whether the store has been loaded in this process
    pub fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    /// Checks an identity, loading the store on first use
    pub fn verdict(
        &mut self,
        identity: &OutboundIdentity,
        now: DateTime<Utc>,
    ) -> StorageResult<UsageVerdict> {
        self.load()?;

        if !identity.ready {
            return Ok(UsageVerdict::NotReady);
        }

        let verdict = self
            .records
            .as_ref()
            .and_then(|records| records.get(&identity.external_address))
            .map(|record| record.verdict(now))
            .unwrap_or(UsageVerdict::Ready);

        match verdict {
            UsageVerdict::Ready => {
                tracing::debug!("Identity {} is ready for use", identity.external_address)
            }
            UsageVerdict::Cooldown { remaining } => tracing::info!(
                "Identity {} needs {} seconds cooldown, not ready for use yet",
                identity.external_address,
                remaining.as_secs()
            ),
            UsageVerdict::NotReady => {}
        }

        Ok(verdict)
    }

    /// Returns whether `identity` may be used at `now`
    pub fn is_usable(
        &mut self,
        identity: &OutboundIdentity,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        Ok(self.verdict(identity, now)?.is_ready())
    }

    /// Records one use of `identity` and persists the whole store
    ///
    /// # Errors
    ///
    /// * `RankError::UsageNotLoaded` - no check or load happened before
    /// * `RankError::Storage` - the store could not be written
    pub fn record_use(
        &mut self,
        identity: &OutboundIdentity,
        now: DateTime<Utc>,
    ) -> Result<(), RankError> {
        let records = self.records.as_mut().ok_or(RankError::UsageNotLoaded)?;

        records
            .entry(identity.external_address.clone())
            .or_insert_with(|| UsageRecord::new(now))
            .record(now);

        let payload = serde_json::to_vec_pretty(records).map_err(StorageError::from)?;
        write_atomic(&self.path, &payload)?;
        Ok(())
    }

    /// Usage history of an external address, if any
    pub fn record(&self, external_address: &str) -> Option<&UsageRecord> {
        self.records.as_ref()?.get(external_address)
    }
}
