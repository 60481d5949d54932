//! Result page fetcher
//!
//! This module handles all HTTP requests to the search engine, including:
//! - Building the result page URL for a keyword, page and locale
//! - Building HTTP clients routed through the active outbound identity
//! - Classifying responses (transport errors, empty bodies, abuse pages)
//!
//! The fetcher never retries. Retry budgets belong to the run loop.

use crate::config::{Locale, PageSize};
use crate::state::OutboundIdentity;
use crate::RankError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use std::time::Duration;
use url::form_urlencoded;

/// Desktop browser user agent sent with every result page request
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Connect and overall request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Bodies shorter than this are treated as empty
pub const MIN_BODY_BYTES: usize = 20;

/// Markers of the search engine's automated traffic page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseSignature {
    SpywareWarning,
    NetworkAffected,
    AntivirusLink,
    WarningImage,
}

impl AbuseSignature {
    pub const ALL: [AbuseSignature; 4] = [
        Self::SpywareWarning,
        Self::NetworkAffected,
        Self::AntivirusLink,
        Self::WarningImage,
    ];

    /// The text fragment identifying this signature
    pub fn marker(&self) -> &'static str {
        match self {
            Self::SpywareWarning => "computer virus or spyware application",
            Self::NetworkAffected => "entire network is affected",
            Self::AntivirusLink => "http://www.download.com/Antivirus",
            Self::WarningImage => "/images/yellow_warning.gif",
        }
    }

    /// Finds the first signature present in `body`
    pub fn detect(body: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sig| body.contains(sig.marker()))
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// The result page markup
    Success(String),

    /// Transport failure or unreadable body
    ConnectionError(String),

    /// The body was too short to be a result page
    EmptyResponse,

    /// The search engine flagged the request as automated
    AbuseDetected { signature: &'static str },
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Classifies a received body
pub fn classify_body(body: String) -> ScrapeOutcome {
    if body.len() < MIN_BODY_BYTES {
        return ScrapeOutcome::EmptyResponse;
    }

    match AbuseSignature::detect(&body) {
        Some(signature) => ScrapeOutcome::AbuseDetected {
            signature: signature.marker(),
        },
        None => ScrapeOutcome::Success(body),
    }
}

/// One result page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerpRequest {
    pub query: String,
    pub page_index: u32,
    pub locale: Locale,
    pub page_size: PageSize,
    pub filter: bool,
}

impl SerpRequest {
    /// Builds the result page URL
    ///
    /// # Example
    ///
    /// ```
    /// use serp_rank::config::{Locale, PageSize};
    /// use serp_rank::crawler::SerpRequest;
    ///
    /// let request = SerpRequest {
    ///     query: "red shoes".to_string(),
    ///     page_index: 1,
    ///     locale: Locale::new("de", "de"),
    ///     page_size: PageSize::Ten,
    ///     filter: true,
    /// };
    /// let url = request.url();
    /// assert!(url.starts_with("http://www.google.de/search?q=red+shoes&hl=de"));
    /// assert!(url.contains("&start=10&num=10&filter=1"));
    /// ```
    pub fn url(&self) -> String {
        let query: String = form_urlencoded::byte_serialize(self.query.as_bytes()).collect();

        let mut url = format!(
            "http://{}/search?q={}&hl={}&ie=utf-8&as_qdr=all&aq=t&rls=org:mozilla:us:official&client=firefox",
            self.locale.search_domain(),
            query,
            self.locale.language
        );
        if self.page_index > 0 {
            url.push_str(&format!("&start={}", self.page_size.offset(self.page_index)));
        }
        url.push_str(&format!(
            "&num={}&filter={}",
            self.page_size.count(),
            if self.filter { 1 } else { 0 }
        ));
        url
    }
}

/// Source of result pages
///
/// Implemented by [`SerpFetcher`]; the run loop only depends on this trait.
#[async_trait]
pub trait SerpSource: Send {
    /// Routes subsequent fetches through `identity`
    fn bind(&mut self, identity: &OutboundIdentity) -> Result<(), RankError>;

    /// Fetches and classifies one result page
    async fn fetch(&mut self, request: &SerpRequest) -> ScrapeOutcome;
}

/// Builds an HTTP client that sends all traffic through `identity`
pub fn build_http_client(identity: &OutboundIdentity) -> Result<Client, reqwest::Error> {
    Client::builder()
        .proxy(Proxy::all(identity.proxy_url())?)
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(REQUEST_TIMEOUT)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches result pages over HTTP
#[derive(Debug, Clone)]
pub struct SerpFetcher {
    client: Option<Client>,
    error_pause: Duration,
}

impl SerpFetcher {
    /// Creates a fetcher with no identity bound yet
    pub fn new(error_pause: Duration) -> Self {
        Self {
            client: None,
            error_pause,
        }
    }

    /// Creates a fetcher using `client` as is
    pub fn with_client(client: Client, error_pause: Duration) -> Self {
        Self {
            client: Some(client),
            error_pause,
        }
    }

    async fn get(client: &Client, url: &str) -> ScrapeOutcome {
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    "Request timeout".to_string()
                } else if e.is_connect() {
                    format!("Connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return ScrapeOutcome::ConnectionError(error);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Search engine answered HTTP {}", status.as_u16());
        }

        match response.text().await {
            Ok(body) => classify_body(body),
            Err(e) => ScrapeOutcome::ConnectionError(format!("Unreadable body: {}", e)),
        }
    }
}

#[async_trait]
impl SerpSource for SerpFetcher {
    fn bind(&mut self, identity: &OutboundIdentity) -> Result<(), RankError> {
        self.client = Some(build_http_client(identity)?);
        tracing::debug!("HTTP client bound to {}", identity);
        Ok(())
    }

    async fn fetch(&mut self, request: &SerpRequest) -> ScrapeOutcome {
        let url = request.url();
        tracing::debug!("Fetching {}", url);

        let outcome = match &self.client {
            Some(client) => Self::get(client, &url).await,
            None => ScrapeOutcome::ConnectionError("no outbound identity bound".to_string()),
        };

        match &outcome {
            ScrapeOutcome::ConnectionError(error) => {
                tracing::warn!("Fetch of page {} failed: {}", request.page_index, error);
                tokio::time::sleep(self.error_pause).await;
            }
            ScrapeOutcome::EmptyResponse => {
                tracing::warn!("Empty response for page {}", request.page_index);
                tokio::time::sleep(self.error_pause).await;
            }
            ScrapeOutcome::AbuseDetected { signature } => {
                tracing::error!("Abuse page received (signature: {})", signature);
            }
            ScrapeOutcome::Success(body) => {
                tracing::trace!("Received {} bytes", body.len());
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_for(server: &MockServer, page_index: u32) -> SerpRequest {
        let mut locale = Locale::new("global", "en");
        locale.domain = Some(server.address().to_string());
        SerpRequest {
            query: "shoes".to_string(),
            page_index,
            locale,
            page_size: PageSize::Ten,
            filter: true,
        }
    }

    fn fetcher() -> SerpFetcher {
        SerpFetcher::with_client(Client::new(), Duration::ZERO)
    }

    #[test]
    fn test_first_page_url_has_no_offset() {
        let request = SerpRequest {
            query: "shoes".to_string(),
            page_index: 0,
            locale: Locale::new("global", "en"),
            page_size: PageSize::Hundred,
            filter: false,
        };
        assert_eq!(
            request.url(),
            "http://www.google.com/search?q=shoes&hl=en&ie=utf-8&as_qdr=all&aq=t\
             &rls=org:mozilla:us:official&client=firefox&num=100&filter=0"
        );
    }

    #[test]
    fn test_query_is_encoded() {
        let mut request = SerpRequest {
            query: "café & co".to_string(),
            page_index: 2,
            locale: Locale::new("uk", "en"),
            page_size: PageSize::Hundred,
            filter: true,
        };
        let url = request.url();
        assert!(url.contains("q=caf%C3%A9+%26+co&"));
        assert!(url.contains("&start=200&num=100"));

        request.locale.domain = Some("localhost:9000".to_string());
        assert!(request.url().starts_with("http://localhost:9000/search?"));
    }

    #[test]
    fn test_classify_body() {
        assert_eq!(classify_body("short".to_string()), ScrapeOutcome::EmptyResponse);
        assert!(classify_body("<html><body>results</body></html>".to_string()).is_success());

        for signature in AbuseSignature::ALL {
            let body = format!("<html><p>{}</p></html>", signature.marker());
            assert_eq!(
                classify_body(body),
                ScrapeOutcome::AbuseDetected {
                    signature: signature.marker()
                }
            );
        }
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let identity = OutboundIdentity {
            address: "10.0.0.1".to_string(),
            port: 3128,
            external_address: "198.51.100.1".to_string(),
            ready: true,
        };
        assert!(build_http_client(&identity).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "shoes"))
            .and(query_param("start", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><ol><li class=\"g\">result</li></ol></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = fetcher().fetch(&request_for(&server, 1)).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_fetch_abuse_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string(
                "<html>Our systems have detected unusual traffic. Your computer virus or spyware application may be sending requests.</html>",
            ))
            .mount(&server)
            .await;

        let outcome = fetcher().fetch(&request_for(&server, 0)).await;
        assert_eq!(
            outcome,
            ScrapeOutcome::AbuseDetected {
                signature: "computer virus or spyware application"
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let outcome = fetcher().fetch(&request_for(&server, 0)).await;
        assert_eq!(outcome, ScrapeOutcome::EmptyResponse);
    }

    #[tokio::test]
    async fn test_fetch_connection_error() {
        // Bind and drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut locale = Locale::new("global", "en");
        locale.domain = Some(format!("127.0.0.1:{}", port));
        let request = SerpRequest {
            query: "shoes".to_string(),
            page_index: 0,
            locale,
            page_size: PageSize::Ten,
            filter: true,
        };

        let outcome = fetcher().fetch(&request).await;
        assert!(matches!(outcome, ScrapeOutcome::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_unbound_fetcher_reports_connection_error() {
        let request = SerpRequest {
            query: "shoes".to_string(),
            page_index: 0,
            locale: Locale::default(),
            page_size: PageSize::Ten,
            filter: true,
        };
        let outcome = SerpFetcher::new(Duration::ZERO).fetch(&request).await;
        assert!(matches!(outcome, ScrapeOutcome::ConnectionError(_)));
    }
}
