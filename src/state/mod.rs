//! State module for outbound identities
//!
//! # Components
//!
//! - `OutboundIdentity`: the currently leased egress point
//! - `LicenseInfo`: proxy license details that size the request delay
//! - `IdentityRateLimiter`: persisted per-identity usage and cooldowns

mod identity;
mod usage;

// Re-export main types
pub use identity::{LicenseInfo, OutboundIdentity};
pub use usage::{IdentityRateLimiter, UsageRecord, UsageVerdict, COOLDOWN, USAGE_FILE, USAGE_WINDOW};
