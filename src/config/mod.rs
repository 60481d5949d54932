//! Configuration module for Serp-Rank
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use serp_rank::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("rank.toml")).unwrap();
//! println!("Checking {} keywords", config.target.keywords.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    country_domain, CacheConfig, CacheMode, Config, LimitsConfig, Locale, OutputConfig, PageSize, ReportFormat,
    RotationConfig, TargetConfig,
};

// Re-export parser functions
pub use parser::load_config;
