use std::fmt;
use std::time::Duration;

/// Requests per hour a single identity may make before the search engine
/// starts to notice, with a small safety margin
const REQUESTS_PER_IDENTITY_HOUR: f64 = 19.9;

/// A leased egress point handed out by the rotation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundIdentity {
    /// Proxy host to connect to
    pub address: String,

    /// Proxy port to connect to
    pub port: u16,

    /// The address the search engine sees; usage is tracked against it
    pub external_address: String,

    /// Whether the proxy finished starting up
    pub ready: bool,
}

impl OutboundIdentity {
    /// Proxy URL usable with an HTTP client
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl fmt::Display for OutboundIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (via {}:{})", self.external_address, self.address, self.port)
    }
}

/// Details about the proxy license, obtained once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseInfo {
    /// Number of identities licensed
    pub max_identities: u32,

    /// Number of identities currently assigned
    pub total_identities: u32,

    /// Proxy protocol (http, socks, vpn)
    pub protocol: String,

    /// Number of proxy processes
    pub process_count: u32,

    /// Whether scraping may proceed at all
    pub active: bool,
}

impl LicenseInfo {
    /// Mandatory pause between two search requests
    ///
    /// Spreads requests evenly so that no identity exceeds about 20 requests
    /// per hour: `3600s / (total_identities * 19.9)`.
    pub fn request_delay(&self) -> Duration {
        let identities = f64::from(self.total_identities.max(1));
        Duration::from_secs_f64(3600.0 / (identities * REQUESTS_PER_IDENTITY_HOUR))
    }
}
