//! End-to-end rank checks
//!
//! The rotation service is a local TCP server answering `hello` and `rotate`.
//! Its identities point at the wiremock server, which also serves as the
//! search engine host, so every request lands on the mock either way.

use serp_rank::config::{
    CacheConfig, Config, LimitsConfig, Locale, OutputConfig, RotationConfig, TargetConfig,
};
use serp_rank::crawler::{RankChecker, SerpFetcher};
use serp_rank::rotation::RotationClient;
use serp_rank::state::IdentityRateLimiter;
use serp_rank::RankError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A large license keeps the mandatory request delay in the milliseconds
const HELLO: &str = "HELLO:5000:5000:http:4";

/// Starts a rotation service whose proxies point at `proxy_port`
///
/// Returns the service port and a counter of rotate commands served.
async fn start_rotation_service(proxy_port: u16) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let rotations = Arc::new(AtomicUsize::new(0));
    let counter = rotations.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = vec![0u8; 2048];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let body = if request.contains("cmd=rotate") {
                let served = counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("ROTATE:127.0.0.1:{}:203.0.113.{}", proxy_port, served)
            } else {
                HELLO.to_string()
            };

            let reply = format!("HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n{}", body);
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (port, rotations)
}

fn serp_markup(urls: &[&str], next: bool) -> String {
    let items: String = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            format!(
                r#"<li class="g"><h3 class="r"><a href="/url?q={}&amp;sa=U">Result number {}</a></h3><div class="s"><cite>{}</cite><span class="st">Snippet for result {}</span></div></li>"#,
                url,
                i + 1,
                url,
                i + 1
            )
        })
        .collect();
    let nav = if next {
        r#"<table id="nav"><tr><td><a href="/search?q=shoes&amp;start=10" class="pn" id="pnnext">Next</a></td></tr></table>"#
    } else {
        ""
    };

    format!(
        r#"<html><head><title>shoes - Search</title></head><body><div id="tads"><ol><li class="ads-ad"><h3><a href="http://ads.example/">Ad</a></h3></li></ol></div><div id="ires"><ol>{}</ol></div>{}</body></html>"#,
        items, nav
    )
}

fn ten_results() -> String {
    serp_markup(
        &[
            "http://www.one.example/",
            "http://www.two.example/",
            "http://www.three.example/",
            "http://www.example.com/shoes.html",
            "http://www.five.example/",
            "http://www.six.example/",
            "http://www.seven.example/",
            "http://www.eight.example/",
            "http://www.nine.example/",
            "http://www.ten.example/",
        ],
        false,
    )
}

fn create_test_config(dir: &TempDir, server: &MockServer, rotation_port: u16) -> Config {
    Config {
        target: TargetConfig {
            site: "example.com".to_string(),
            keywords: vec!["shoes".to_string()],
            max_pages: 2,
            results_per_page: 10,
            filter: true,
            stop_when_found: false,
        },
        locale: Locale {
            country: "global".to_string(),
            language: "en".to_string(),
            domain: Some(server.address().to_string()),
        },
        cache: CacheConfig::default(),
        rotation: RotationConfig {
            portal: "int".to_string(),
            host: Some("127.0.0.1".to_string()),
            port: rotation_port,
            user_id: "4711".to_string(),
            password: "secret".to_string(),
        },
        limits: LimitsConfig {
            fetch_error_pause_secs: 0,
            rotation_backoff_secs: 0,
            ..LimitsConfig::default()
        },
        output: OutputConfig {
            working_dir: dir.path().to_string_lossy().to_string(),
            ..OutputConfig::default()
        },
    }
}

fn checker(config: Config) -> RankChecker<RotationClient, SerpFetcher> {
    RankChecker::new(
        config.clone(),
        RotationClient::new(&config.rotation),
        SerpFetcher::new(Duration::ZERO),
    )
}

#[tokio::test]
async fn test_end_to_end_rank_check() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let (rotation_port, rotations) = start_rotation_service(server.address().port()).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "shoes"))
        .and(query_param("num", "10"))
        .and(query_param("filter", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ten_results()))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, rotation_port);
    let report = checker(config).run().await.expect("Rank check failed");

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].results.len(), 10);
    assert_eq!(report.records[0].results[0].title, "Result number 1");
    assert_eq!(report.records[0].results[0].host, "www.one.example");
    assert_eq!(
        report.records[0].results[0].description,
        "Snippet for result 1"
    );
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].rank, 4);
    assert_eq!(report.matches[0].url, "http://www.example.com/shoes.html");
    assert_eq!(rotations.load(Ordering::SeqCst), 1);

    // The identity use was persisted under its external address
    let mut limiter = IdentityRateLimiter::new(dir.path());
    limiter.load().unwrap();
    let record = limiter.record("203.0.113.1").expect("Usage not recorded");
    assert_eq!(record.total_requests, 1);
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let (rotation_port, rotations) = start_rotation_service(server.address().port()).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ten_results()))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, rotation_port);
    let first = checker(config.clone()).run().await.unwrap();
    let second = checker(config).run().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(rotations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_follows_pagination() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let (rotation_port, _rotations) = start_rotation_service(server.address().port()).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("start", "10"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(serp_markup(&["http://example.com/deep"], false)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(serp_markup(
            &["http://www.one.example/", "http://www.two.example/"],
            true,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, rotation_port);
    let report = checker(config).run().await.unwrap();

    assert_eq!(report.records[0].results.len(), 3);
    assert_eq!(report.matches[0].rank, 3);
}

#[tokio::test]
async fn test_abuse_page_is_fatal() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let (rotation_port, _rotations) = start_rotation_service(server.address().port()).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            r#"<html><body><img src="/images/yellow_warning.gif"> We're sorry...</body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, rotation_port);
    let result = checker(config).run().await;

    assert!(matches!(
        result,
        Err(RankError::AbuseDetected {
            signature: "/images/yellow_warning.gif"
        })
    ));
    // Nothing was cached and no use was recorded
    assert!(!dir.path().join("ipdata.json").exists());
}

#[tokio::test]
async fn test_unreachable_rotation_service() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let dead_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = create_test_config(&dir, &server, dead_port);
    let result = checker(config).run().await;

    assert!(matches!(result, Err(RankError::Rotation(_))));
}
