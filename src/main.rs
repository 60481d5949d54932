//! Serp-Rank main entry point
//!
//! This is the command-line interface for the Serp-Rank rank checker.

use anyhow::Context;
use clap::Parser;
use serp_rank::config::{load_config, CacheMode, Config};
use serp_rank::crawler::{RankChecker, SerpRequest};
use serp_rank::output::print_report;
use serp_rank::storage::{ensure_working_dir, CacheKey};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Serp-Rank: a rate-limited search engine rank checker
///
/// Serp-Rank looks up where a website ranks for a list of keywords. Result
/// pages are fetched through rotating proxies at a license-sized pace and
/// cached locally for 24 hours.
#[derive(Parser, Debug)]
#[command(name = "serp-rank")]
#[command(version = "1.0.0")]
#[command(about = "A rate-limited search engine rank checker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be checked without any network access
    #[arg(long)]
    dry_run: bool,

    /// Use cached pages regardless of their age
    #[arg(long, conflicts_with = "fresh")]
    force_cache: bool,

    /// Ignore cached pages (fresh results are still cached)
    #[arg(long, conflicts_with = "force_cache")]
    fresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully");

    if cli.force_cache {
        config.cache.mode = CacheMode::Force;
    } else if cli.fresh {
        config.cache.mode = CacheMode::Bypass;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_check(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("serp_rank=info,warn"),
            1 => EnvFilter::new("serp_rank=debug,info"),
            2 => EnvFilter::new("serp_rank=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved plan
fn handle_dry_run(config: &Config) {
    let working_dir = Path::new(&config.output.working_dir);
    let page_size = config.target.page_size();

    println!("=== Serp-Rank Dry Run ===\n");

    println!("Target: {}", config.target.site);
    println!(
        "Search engine: {} (country {}, language {})",
        config.locale.search_domain(),
        config.locale.country,
        config.locale.language
    );
    println!(
        "Pages: up to {} per keyword, {} results each, filter {}",
        config.target.max_pages,
        page_size.count(),
        if config.target.filter { "on" } else { "off" }
    );
    println!("Cache mode: {:?}", config.cache.mode);
    println!("Working directory: {}", working_dir.display());
    println!(
        "Rotation API: {}:{} (user {})",
        config.rotation.api_host(),
        config.rotation.port,
        config.rotation.user_id
    );

    println!("\nKeywords ({}):", config.target.keywords.len());
    for keyword in &config.target.keywords {
        let first_page = SerpRequest {
            query: keyword.clone(),
            page_index: 0,
            locale: config.locale.clone(),
            page_size,
            filter: config.target.filter,
        };
        let cached = working_dir
            .join(format!(
                "{}.cache",
                CacheKey::new(keyword, &config.locale, 0, page_size)
            ))
            .exists();

        println!("  - {}", keyword);
        println!("    {}", first_page.url());
        println!("    first page cached: {}", if cached { "yes" } else { "no" });
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main rank check
async fn handle_check(config: Config) -> anyhow::Result<()> {
    let format = config.output.format;
    let show_all_ranks = config.output.show_all_ranks;

    ensure_working_dir(Path::new(&config.output.working_dir)).with_context(|| {
        format!(
            "Failed to create working directory {}",
            config.output.working_dir
        )
    })?;

    match RankChecker::from_config(config).run().await {
        Ok(report) => {
            tracing::info!(
                "Rank check completed: {} keywords, {} matches",
                report.records.len(),
                report.matches.len()
            );
            print_report(&report, format, show_all_ranks);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Rank check failed: {}", e);
            Err(e.into())
        }
    }
}
