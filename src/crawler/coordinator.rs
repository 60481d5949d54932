//! Rank checker - main run orchestration logic
//!
//! This module contains the keyword/page loop that coordinates all parts of
//! a run, including:
//! - Validating the proxy license at startup
//! - Serving pages from the cache when possible
//! - Rotating and rate limiting outbound identities
//! - Fetching, extracting and caching result pages
//! - Accumulating ranks and target site matches
//!
//! Every fatal condition is returned as a `RankError`; nothing in here ends
//! the process.

use crate::config::{CacheMode, Config, LimitsConfig, Locale, PageSize, TargetConfig};
use crate::crawler::fetcher::{ScrapeOutcome, SerpFetcher, SerpRequest, SerpSource};
use crate::crawler::parser::Extractor;
use crate::rotation::{IdentityBroker, RotationClient, RotationError};
use crate::state::{IdentityRateLimiter, LicenseInfo, OutboundIdentity, UsageVerdict};
use crate::storage::{CacheEntry, CacheKey, CacheManager, SearchResult};
use crate::RankError;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

/// Ranked results of one keyword, in rank order (rank = index + 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRecord {
    pub keyword: String,
    pub results: Vec<SearchResult>,
}

impl RankRecord {
    fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            results: Vec::new(),
        }
    }

    /// Iterates `(rank, result)` pairs, ranks starting at 1
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &SearchResult)> {
        self.results.iter().enumerate().map(|(i, r)| (i + 1, r))
    }
}

/// A position at which the target site was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRankMatch {
    pub keyword: String,
    pub rank: usize,
    pub url: String,
}

/// Everything a run found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankReport {
    pub target: String,
    pub locale: Locale,
    pub keywords: Vec<String>,
    pub records: Vec<RankRecord>,
    pub matches: Vec<SiteRankMatch>,
}

impl RankReport {
    /// Matches of the target site for `keyword`
    pub fn matches_for<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a SiteRankMatch> {
        self.matches.iter().filter(move |m| m.keyword == keyword)
    }
}

/// What the page loop does after one attempt at a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    /// The page is available (from cache or freshly fetched)
    Page(CacheEntry),
    /// The fetch failed and the keyword budget allows another attempt
    Retry,
    /// The keyword budget is spent; move on to the next keyword
    SkipKeyword,
}

/// Error budgets of a run
#[derive(Debug, Clone, Copy)]
struct Budgets {
    keyword: u32,
    run: u32,
}

/// Main run coordinator
pub struct RankChecker<B: IdentityBroker, S: SerpSource> {
    target: TargetConfig,
    locale: Locale,
    cache_mode: CacheMode,
    limits: LimitsConfig,
    broker: B,
    source: S,
    limiter: IdentityRateLimiter,
    cache: CacheManager,
    extractor: Extractor,
    identity: Option<OutboundIdentity>,
    license: Option<LicenseInfo>,
}

impl RankChecker<RotationClient, SerpFetcher> {
    /// Creates a checker talking to the real rotation service and search engine
    pub fn from_config(config: Config) -> Self {
        let broker = RotationClient::new(&config.rotation);
        let source = SerpFetcher::new(Duration::from_secs(config.limits.fetch_error_pause_secs));
        Self::new(config, broker, source)
    }
}

impl<B: IdentityBroker, S: SerpSource> RankChecker<B, S> {
    /// Creates a checker with the given identity broker and page source
    ///
    /// The cache and usage store live in `config.output.working_dir`, which
    /// must already exist.
    pub fn new(config: Config, broker: B, source: S) -> Self {
        let working_dir = Path::new(&config.output.working_dir);
        let page_size = config.target.page_size();

        Self {
            limiter: IdentityRateLimiter::new(working_dir),
            cache: CacheManager::new(working_dir),
            extractor: Extractor::new(page_size),
            target: config.target,
            locale: config.locale,
            cache_mode: config.cache.mode,
            limits: config.limits,
            broker,
            source,
            identity: None,
            license: None,
        }
    }

    fn page_size(&self) -> PageSize {
        self.target.page_size()
    }

    /// The identity broker (test inspection)
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// The page source (test inspection)
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs all keywords and returns the collected ranks
    ///
    /// # Errors
    ///
    /// Any fatal condition: inactive license, protocol mismatch, abuse
    /// detection, failed rotation, no fresh identity, exhausted run error
    /// budget, or a storage failure.
    pub async fn run(&mut self) -> Result<RankReport, RankError> {
        self.check_license().await?;

        tracing::info!(
            "Checking {} keywords for {} ({}, {} results per page, up to {} pages)",
            self.target.keywords.len(),
            self.target.site,
            self.locale.search_domain(),
            self.page_size().count(),
            self.target.max_pages
        );

        let mut report = RankReport {
            target: self.target.site.clone(),
            locale: self.locale.clone(),
            keywords: self.target.keywords.clone(),
            records: Vec::new(),
            matches: Vec::new(),
        };
        let mut run_budget = self.limits.run_error_budget;

        let keywords = self.target.keywords.clone();
        for keyword in &keywords {
            let (record, matches) = self.check_keyword(keyword, &mut run_budget).await?;

            match matches.first() {
                Some(first) => tracing::info!(
                    "'{}': {} found at rank {} ({} results checked)",
                    keyword,
                    self.target.site,
                    first.rank,
                    record.results.len()
                ),
                None => tracing::info!(
                    "'{}': {} not found in {} results",
                    keyword,
                    self.target.site,
                    record.results.len()
                ),
            }

            report.records.push(record);
            report.matches.extend(matches);
        }

        Ok(report)
    }

    /// Fetches the license and refuses to run without a usable one
    async fn check_license(&mut self) -> Result<(), RankError> {
        let license = self.broker.fetch_license().await?;

        if !license.active {
            return Err(RankError::LicenseInactive);
        }
        if license.protocol != "http" {
            return Err(RankError::ProtocolMismatch {
                protocol: license.protocol,
            });
        }

        tracing::debug!(
            "Request delay is {:.1}s",
            license.request_delay().as_secs_f64()
        );
        self.license = Some(license);
        Ok(())
    }

    /// Walks the result pages of one keyword
    async fn check_keyword(
        &mut self,
        keyword: &str,
        run_budget: &mut u32,
    ) -> Result<(RankRecord, Vec<SiteRankMatch>), RankError> {
        let mut record = RankRecord::new(keyword);
        let mut matches = Vec::new();
        let mut budgets = Budgets {
            keyword: self.limits.keyword_error_budget,
            run: *run_budget,
        };
        let mut rotate = true;
        let mut page_index = 0;

        while page_index < self.target.max_pages {
            let step = self
                .next_page(keyword, page_index, &mut rotate, &mut budgets)
                .await;
            *run_budget = budgets.run;

            let entry = match step? {
                PageStep::Page(entry) => entry,
                PageStep::Retry => continue,
                PageStep::SkipKeyword => break,
            };

            for result in entry.results {
                let rank = record.results.len() + 1;
                if result.url.contains(&self.target.site) {
                    tracing::debug!("Located {} at rank {}", self.target.site, rank);
                    matches.push(SiteRankMatch {
                        keyword: keyword.to_string(),
                        rank,
                        url: result.url.clone(),
                    });
                }
                record.results.push(result);
            }

            if !entry.has_next_page {
                tracing::debug!("'{}': page {} is the last page", keyword, page_index);
                break;
            }
            if self.target.stop_when_found && !matches.is_empty() {
                break;
            }
            page_index += 1;
        }

        Ok((record, matches))
    }

    /// Produces one page, from the cache or the search engine
    ///
    /// `rotate` forces a rotation before the next fetch and is cleared once
    /// one happened.
    async fn next_page(
        &mut self,
        keyword: &str,
        page_index: u32,
        rotate: &mut bool,
        budgets: &mut Budgets,
    ) -> Result<PageStep, RankError> {
        let key = CacheKey::new(keyword, &self.locale, page_index, self.page_size());
        let force = self.cache_mode == CacheMode::Force;
        let bypass = self.cache_mode == CacheMode::Bypass;

        if let Some(cached) = self.cache.load(&key, force, bypass)? {
            tracing::info!(
                "'{}' page {}: {} results from cache (stored {})",
                keyword,
                page_index,
                cached.entry.result_count,
                cached.stored_at.format("%Y-%m-%d %H:%M")
            );
            return Ok(PageStep::Page(cached.entry));
        }

        let identity = self.ensure_identity(*rotate).await?;
        *rotate = false;

        tokio::time::sleep(self.request_delay()).await;

        let request = SerpRequest {
            query: keyword.to_string(),
            page_index,
            locale: self.locale.clone(),
            page_size: self.page_size(),
            filter: self.target.filter,
        };

        let outcome = self.source.fetch(&request).await;
        let markup = match outcome {
            ScrapeOutcome::Success(markup) => markup,
            ScrapeOutcome::AbuseDetected { signature } => {
                tracing::error!(
                    "Search engine flagged {} as automated traffic",
                    identity.external_address
                );
                return Err(RankError::AbuseDetected { signature });
            }
            ScrapeOutcome::ConnectionError(error) => {
                return self.on_fetch_failure(keyword, page_index, &error, budgets);
            }
            ScrapeOutcome::EmptyResponse => {
                return self.on_fetch_failure(keyword, page_index, "empty response", budgets);
            }
        };

        self.limiter.record_use(&identity, Utc::now())?;

        let extracted = self.extractor.extract(&markup, page_index);
        let entry = CacheEntry {
            result_count: extracted.results.len(),
            results: extracted.results,
            page_index,
            has_next_page: extracted.has_next_page,
            keyword: keyword.to_string(),
            country: self.locale.country.clone(),
            language: self.locale.language.clone(),
        };
        self.cache.store(&key, &entry)?;

        tracing::info!(
            "'{}' page {}: {} results scraped",
            keyword,
            page_index,
            entry.result_count
        );
        Ok(PageStep::Page(entry))
    }

    /// Spends the error budgets after a failed fetch
    fn on_fetch_failure(
        &self,
        keyword: &str,
        page_index: u32,
        error: &str,
        budgets: &mut Budgets,
    ) -> Result<PageStep, RankError> {
        if budgets.keyword > 0 {
            budgets.keyword -= 1;
            tracing::warn!(
                "Error scraping '{}' page {} ({}), trying again",
                keyword,
                page_index,
                error
            );
            Ok(PageStep::Retry)
        } else if budgets.run > 0 {
            budgets.run -= 1;
            tracing::warn!(
                "Too many errors scraping '{}' (at page {}), skipping its remaining pages",
                keyword,
                page_index
            );
            Ok(PageStep::SkipKeyword)
        } else {
            tracing::error!("Maximum keyword errors reached at '{}'", keyword);
            Err(RankError::RunErrorBudgetExhausted {
                keyword: keyword.to_string(),
            })
        }
    }

    /// Returns an identity that may be used right now
    ///
    /// Rotates when forced, when there is no identity yet, or when the current
    /// one is cooling down. A freshly rotated identity that is still cooling
    /// down means the pool is exhausted.
    async fn ensure_identity(&mut self, force_rotate: bool) -> Result<OutboundIdentity, RankError> {
        let now = Utc::now();

        if !force_rotate {
            if let Some(identity) = self.identity.clone() {
                if self.limiter.is_usable(&identity, now)? {
                    return Ok(identity);
                }
            }
        }

        let identity = self.rotate_with_retries().await?;

        match self.limiter.verdict(&identity, Utc::now())? {
            UsageVerdict::Ready => {}
            UsageVerdict::Cooldown { remaining } => {
                return Err(RankError::NoFreshIdentity {
                    address: identity.external_address,
                    cooldown_secs: remaining.as_secs(),
                });
            }
            UsageVerdict::NotReady => {
                return Err(RankError::NoFreshIdentity {
                    address: identity.external_address,
                    cooldown_secs: 0,
                });
            }
        }

        self.source.bind(&identity)?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Rotates, retrying with a fixed backoff
    async fn rotate_with_retries(&mut self) -> Result<OutboundIdentity, RankError> {
        let attempts = self.limits.rotation_attempts.max(1);
        let backoff = Duration::from_secs(self.limits.rotation_backoff_secs);
        let mut last: Option<RotationError> = None;

        for attempt in 1..=attempts {
            match self.broker.rotate().await {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    tracing::warn!("Proxy rotation attempt {}/{} failed: {}", attempt, attempts, e);
                    last = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let last = last.unwrap_or_else(|| RotationError::Service("no rotation attempted".to_string()));
        tracing::error!("Proxy rotation failed {} times", attempts);
        Err(RankError::RotationExhausted { attempts, last })
    }

    fn request_delay(&self) -> Duration {
        self.license
            .as_ref()
            .map(LicenseInfo::request_delay)
            .unwrap_or(Duration::ZERO)
    }
}
