//! Configuration loading through the public API

use serp_rank::config::{load_config, CacheMode, PageSize, ReportFormat};
use serp_rank::crawler::RankReport;
use serp_rank::output::format_report;
use serp_rank::ConfigError;
use std::io::Write;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[target]
site = "http://www.example.com"
keywords = ["red shoes", "blue shoes"]
max-pages = 2
results-per-page = 100
filter = false
stop-when-found = true

[locale]
country = "uk"
language = "en"

[cache]
mode = "bypass"

[rotation]
portal = "us"
port = 8080
user-id = "4711"
password = "secret"

[limits]
keyword-error-budget = 2
run-error-budget = 1
rotation-attempts = 4
rotation-backoff-secs = 5
fetch-error-pause-secs = 1

[output]
working-dir = "/tmp/serp-rank"
show-all-ranks = false
format = "html"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_config_round_trip() {
    let file = write_config(FULL_CONFIG);
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.target.page_size(), PageSize::Hundred);
    assert!(!config.target.filter);
    assert!(config.target.stop_when_found);
    assert_eq!(config.locale.search_domain(), "www.google.co.uk");
    assert_eq!(config.cache.mode, CacheMode::Bypass);
    assert_eq!(config.rotation.api_host(), "us.seo-proxies.com");
    assert_eq!(config.rotation.port, 8080);
    assert_eq!(config.limits.rotation_attempts, 4);
    assert_eq!(config.output.format, ReportFormat::Html);
    assert!(!config.output.show_all_ranks);
}

#[test]
fn test_missing_credentials_are_rejected() {
    let content = FULL_CONFIG.replace("password = \"secret\"", "password = \"\"");
    let file = write_config(&content);

    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_unknown_country_is_rejected() {
    let content = FULL_CONFIG.replace("country = \"uk\"", "country = \"zz\"");
    let file = write_config(&content);

    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_second_level_country_domain() {
    let content = FULL_CONFIG.replace("country = \"uk\"", "country = \"au\"");
    let file = write_config(&content);
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.locale.search_domain(), "www.google.com.au");
}

#[test]
fn test_missing_rotation_section_is_a_parse_error() {
    let content = r#"
[target]
site = "example.com"
keywords = ["shoes"]
max-pages = 1
"#;
    let file = write_config(content);

    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_empty_report_renders_not_found_lines() {
    let file = write_config(FULL_CONFIG);
    let config = load_config(file.path()).unwrap();

    let report = RankReport {
        target: config.target.site.clone(),
        locale: config.locale.clone(),
        keywords: config.target.keywords.clone(),
        records: Vec::new(),
        matches: Vec::new(),
    };
    let html = format_report(&report, config.output.format, config.output.show_all_ranks);

    assert!(html.starts_with("<html><body>"));
    assert!(html.contains("<b> Rank check for http://www.example.com via www.google.co.uk </b>"));
    assert!(html.contains(
        "<b>The specified site was not found in the search results for keyword \"red shoes\". </b><br>"
    ));
    assert!(html.contains("keyword \"blue shoes\". </b><br>"));
    assert!(html.trim_end().ends_with("</body></html>"));
}
