//! Serp-Rank: a rate-limited search engine rank checker
//!
//! This crate looks up where a target website ranks for a set of keywords by
//! fetching result pages through rotating outbound identities, extracting the
//! organic results, and caching every page locally for a day.

pub mod config;
pub mod crawler;
pub mod output;
pub mod rotation;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Serp-Rank operations
///
/// Every variant that reaches the top of a run is fatal; transient fetch
/// failures are handled inside the orchestrator and never surface here.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Proxy rotation service error: {0}")]
    Rotation(#[from] rotation::RotationError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("The proxy license is not active")]
    LicenseInactive,

    #[error("Proxy protocol of the license is '{protocol}', it must be set to http")]
    ProtocolMismatch { protocol: String },

    #[error("Abuse detected by the search engine (signature: {signature}); the identity pool needs attention")]
    AbuseDetected { signature: &'static str },

    #[error("Proxy rotation failed {attempts} times, check license, firewall and credentials: {last}")]
    RotationExhausted {
        attempts: u32,
        last: rotation::RotationError,
    },

    #[error("No fresh identity left ({address} needs {cooldown_secs}s cooldown), try again later")]
    NoFreshIdentity { address: String, cooldown_secs: u64 },

    #[error("Too many keywords could not be scraped (last: '{keyword}'), something is going wrong")]
    RunErrorBudgetExhausted { keyword: String },

    #[error("Identity usage recorded before the usage store was loaded")]
    UsageNotLoaded,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Serp-Rank operations
pub type Result<T> = std::result::Result<T, RankError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{RankChecker, RankReport};
pub use state::{LicenseInfo, OutboundIdentity};
pub use storage::{CacheEntry, SearchResult};
