//! Rank checking pipeline
//!
//! This module contains the core checking logic, including:
//! - HTTP fetching of result pages and response classification
//! - Markup parsing and organic result extraction
//! - The keyword/page loop tying cache, identities and fetching together

mod coordinator;
mod fetcher;
pub mod markup;
mod parser;

pub use coordinator::{PageStep, RankChecker, RankRecord, RankReport, SiteRankMatch};
pub use fetcher::{
    build_http_client, classify_body, AbuseSignature, ScrapeOutcome, SerpFetcher, SerpRequest,
    SerpSource, MIN_BODY_BYTES, REQUEST_TIMEOUT, USER_AGENT,
};
pub use parser::{resolve_destination, ExtractedPage, Extractor, EMBEDDED_OBJECT};

