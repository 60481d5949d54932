//! TCP client for the proxy rotation API

use crate::config::RotationConfig;
use crate::rotation::protocol::{build_request, parse_response, Command, ProtocolReply, MAX_RESPONSE_BYTES};
use crate::rotation::{IdentityBroker, RotationError};
use crate::state::{LicenseInfo, OutboundIdentity};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Overall time allowed for one request/response exchange
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(8);

/// Pause after a successful rotation so the new proxy finishes booting
pub const ROTATION_SETTLE: Duration = Duration::from_millis(250);

/// Upper bound on reads per exchange
const MAX_READS: usize = 5;

/// Client for the rotation service; one short-lived connection per command
#[derive(Debug, Clone)]
pub struct RotationClient {
    host: String,
    port: u16,
    user_id: String,
    password: String,
    timeout: Duration,
    settle: Duration,
}

impl RotationClient {
    /// Creates a client from the rotation configuration
    pub fn new(config: &RotationConfig) -> Self {
        Self::with_endpoint(
            &config.api_host(),
            config.port,
            &config.user_id,
            &config.password,
        )
    }

    pub fn with_endpoint(host: &str, port: u16, user_id: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user_id: user_id.to_string(),
            password: password.to_string(),
            timeout: RESPONSE_TIMEOUT,
            settle: ROTATION_SETTLE,
        }
    }

    /// Overrides the response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sends `command` and parses the reply, bounded by the response timeout
    async fn exchange(&self, command: Command) -> Result<ProtocolReply, RotationError> {
        let endpoint = self.endpoint();
        match tokio::time::timeout(self.timeout, self.round_trip(&endpoint, command)).await {
            Ok(result) => result,
            Err(_) => Err(RotationError::Timeout { endpoint }),
        }
    }

    async fn round_trip(
        &self,
        endpoint: &str,
        command: Command,
    ) -> Result<ProtocolReply, RotationError> {
        let mut stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| RotationError::connect(endpoint, e))?;

        let request = build_request(command, &self.host, &self.user_id, &self.password);
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| RotationError::connect(endpoint, e))?;

        let mut response = Vec::new();
        let mut buf = [0u8; 8192];
        for _ in 0..MAX_READS {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| RotationError::connect(endpoint, e))?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
            if response.len() > MAX_RESPONSE_BYTES {
                break;
            }
        }

        tracing::trace!("Rotation API replied with {} bytes", response.len());
        parse_response(&response)
    }
}

#[async_trait]
impl IdentityBroker for RotationClient {
    async fn fetch_license(&mut self) -> Result<LicenseInfo, RotationError> {
        match self.exchange(Command::Hello).await? {
            ProtocolReply::Hello(license) => {
                tracing::info!(
                    "License is {} ({} of {} identities assigned, protocol {})",
                    if license.active { "active" } else { "not active" },
                    license.total_identities,
                    license.max_identities,
                    license.protocol
                );
                Ok(license)
            }
            ProtocolReply::Error(message) => Err(RotationError::Service(message)),
            ProtocolReply::Rotate(_) => Err(RotationError::UnexpectedReply {
                expected: "HELLO",
                got: "ROTATE",
            }),
        }
    }

    async fn rotate(&mut self) -> Result<OutboundIdentity, RotationError> {
        match self.exchange(Command::Rotate).await? {
            ProtocolReply::Rotate(identity) => {
                tracing::info!("Received proxy {}", identity);
                tokio::time::sleep(self.settle).await;
                Ok(identity)
            }
            ProtocolReply::Error(message) => Err(RotationError::Service(message)),
            ProtocolReply::Hello(_) => Err(RotationError::UnexpectedReply {
                expected: "ROTATE",
                got: "HELLO",
            }),
        }
    }
}
