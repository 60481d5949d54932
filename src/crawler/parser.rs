//! Result page extractor
//!
//! This module turns a search result page into ordered organic results:
//! - Organic entries are `<li>` elements carrying the `g` class
//! - Title and destination come from the heading link of each entry
//! - The description is located by a text search for its marker fragment
//! - Pagination is detected from the "next" link or the next page's offset
//!
//! Extraction never fails. Markup the extractor does not understand simply
//! yields fewer results.

use crate::config::PageSize;
use crate::crawler::markup::{parse_document, Element};
use crate::storage::SearchResult;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Class marking an organic result list item
const RESULT_CLASS: &str = "g";

/// Fragment that opens the description inside a rendered result
const DESCRIPTION_MARKER: &str = "<span class='st'>";

/// Raw text of a "next page" link
const NEXT_LINK_MARKER: &str = "Next</a>";

/// Title and URL recorded for embedded objects (videos, tables)
pub const EMBEDDED_OBJECT: &str = "embedded object";

/// Query parameters carrying the destination of redirector links
const REDIRECT_PARAMS: [&str; 2] = ["q", "url"];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("hardcoded regex pattern is valid"));

static BASE_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://localhost/").expect("hardcoded base URL is valid"));

/// Results found on one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub results: Vec<SearchResult>,
    pub has_next_page: bool,
}

/// Extracts organic results from result pages of one page-size mode
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    page_size: PageSize,
}

impl Extractor {
    pub fn new(page_size: PageSize) -> Self {
        Self { page_size }
    }

    /// Extracts the organic results of `markup`, which is page `page_index`
    ///
    /// # Example
    ///
    /// ```
    /// use serp_rank::config::PageSize;
    /// use serp_rank::crawler::Extractor;
    ///
    /// let html = r#"<ol><li class="g"><h3><a href="http://www.example.com/">Example</a></h3></li></ol>"#;
    /// let page = Extractor::new(PageSize::Ten).extract(html, 0);
    /// assert_eq!(page.results.len(), 1);
    /// assert_eq!(page.results[0].host, "www.example.com");
    /// assert!(!page.has_next_page);
    /// ```
    pub fn extract(&self, markup: &str, page_index: u32) -> ExtractedPage {
        let root = parse_document(markup);

        let mut results = Vec::new();
        let mut skipped = 0usize;
        for item in root.descendants().filter(|e| e.name == "li") {
            if !item.has_class(RESULT_CLASS) {
                skipped += 1;
                continue;
            }

            match extract_result(item) {
                Some(result) => {
                    tracing::trace!("Parsed result: {}", result.url);
                    results.push(result);
                }
                None => skipped += 1,
            }
        }

        let has_next_page = self.has_next_page(markup, &root, page_index);

        tracing::debug!(
            "Extracted {} results from page {} ({} other list items skipped, next page: {})",
            results.len(),
            page_index,
            skipped,
            has_next_page
        );

        ExtractedPage {
            results,
            has_next_page,
        }
    }

    /// Detects whether another page follows
    ///
    /// The "next" link text is checked first; the offset link of the
    /// following page covers layouts where that text is missing.
    fn has_next_page(&self, markup: &str, root: &Element, page_index: u32) -> bool {
        if markup.contains(NEXT_LINK_MARKER) {
            return true;
        }

        let wanted = self.page_size.offset(page_index + 1).to_string();
        root.descendants().filter(|e| e.name == "a").any(|a| {
            a.attr("id") == Some("pnnext")
                || a.clean_text() == "Next"
                || a.attr("href")
                    .and_then(|href| query_param(href, "start"))
                    .map(|start| start == wanted)
                    .unwrap_or(false)
        })
    }
}

/// Extracts a single result from an organic list item
fn extract_result(item: &Element) -> Option<SearchResult> {
    let link = find_title_link(item);
    let title = link.as_ref().map(|(title, _)| title.clone()).unwrap_or_default();

    if title.chars().count() < 2 {
        if item.find("table").is_some() {
            return Some(SearchResult {
                title: EMBEDDED_OBJECT.to_string(),
                url: EMBEDDED_OBJECT.to_string(),
                host: String::new(),
                description: String::new(),
            });
        }
        return None;
    }

    let url = link
        .and_then(|(_, href)| resolve_destination(&href))
        .unwrap_or_default();
    let host = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    Some(SearchResult {
        title,
        url,
        host,
        description: extract_description(item),
    })
}

/// Finds the result heading link as `(title, href)`
///
/// Handles both `<h3><a href>title</a></h3>` and `<a href><h3>title</h3></a>`.
fn find_title_link(item: &Element) -> Option<(String, String)> {
    for heading in item.descendants().filter(|e| e.name == "h3") {
        if let Some(anchor) = heading.descendants().find(|e| e.name == "a") {
            if let Some(href) = anchor.attr("href") {
                return Some((anchor.clean_text(), href.to_string()));
            }
        }
    }

    item.descendants()
        .filter(|e| e.name == "a")
        .find_map(|anchor| {
            let heading = anchor.find("h3")?;
            let href = anchor.attr("href")?;
            Some((heading.clean_text(), href.to_string()))
        })
}

/// Resolves the destination URL of a result link
///
/// Redirector (`/url?q=...`) and interstitial links are unwrapped through
/// their query parameter; otherwise everything before the scheme is dropped.
pub fn resolve_destination(href: &str) -> Option<String> {
    let href = href.trim();

    if href.starts_with("/url?") || href.contains("interstitial") {
        if href.contains("interstitial") {
            tracing::debug!("Result links to an interstitial page: {}", href);
        }
        let wrapped = REDIRECT_PARAMS
            .iter()
            .filter_map(|param| query_param(href, param))
            .find(|value| value.starts_with("http"));
        if wrapped.is_some() {
            return wrapped;
        }
    }

    href.find("http").map(|pos| href[pos..].to_string())
}

/// Reads query parameter `name` from an absolute or relative href
fn query_param(href: &str, name: &str) -> Option<String> {
    let url = BASE_URL.join(href).ok()?;
    let value = url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned());
    value
}

/// Extracts the description text following the description marker
fn extract_description(item: &Element) -> String {
    let rendered = item.inner_markup();
    let Some(start) = rendered.find(DESCRIPTION_MARKER) else {
        return String::new();
    };

    let fragment = until_closing_span(&rendered[start + DESCRIPTION_MARKER.len()..]);
    let stripped = TAG_RE.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `markup` at the `</span>` closing the span it starts inside
fn until_closing_span(markup: &str) -> &str {
    let mut depth = 0usize;
    let mut pos = 0;

    while let Some(offset) = markup[pos..].find("<") {
        let tag_start = pos + offset;
        let rest = &markup[tag_start..];
        if rest.starts_with("</span>") {
            if depth == 0 {
                return &markup[..tag_start];
            }
            depth -= 1;
        } else if rest.starts_with("<span") {
            depth += 1;
        }
        pos = tag_start + 1;
    }

    markup
}
