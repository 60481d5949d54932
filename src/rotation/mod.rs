//! Proxy rotation service client
//!
//! The rotation service leases outbound identities (HTTP proxies) and reports
//! the license that sizes the identity pool. This module contains:
//! - The text wire protocol (`protocol`)
//! - A TCP client implementing [`IdentityBroker`] (`client`)
//!
//! Failures are never retried here; the run loop owns the retry policy.

mod client;
mod protocol;

pub use client::{RotationClient, RESPONSE_TIMEOUT, ROTATION_SETTLE};
pub use protocol::{build_request, parse_response, Command, ProtocolReply, MAX_RESPONSE_BYTES};

use crate::state::{LicenseInfo, OutboundIdentity};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by the rotation service client
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Unable to reach rotation API at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("Rotation API at {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Invalid rotation API response: {0}")]
    InvalidResponse(String),

    #[error("Rotation API error: {0}")]
    Service(String),

    #[error("Rotation API answered {got}, expected {expected}")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },
}

impl RotationError {
    pub fn connect(endpoint: &str, source: std::io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

/// Source of outbound identities
///
/// Implemented by [`RotationClient`]; the run loop only depends on this trait.
#[async_trait]
pub trait IdentityBroker: Send {
    /// Fetches the license details (the `hello` command)
    async fn fetch_license(&mut self) -> Result<LicenseInfo, RotationError>;

    /// Leases a fresh identity (the `rotate` command)
    async fn rotate(&mut self) -> Result<OutboundIdentity, RotationError>;
}
