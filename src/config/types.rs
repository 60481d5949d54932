use serde::Deserialize;

/// Main configuration structure for Serp-Rank
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub cache: CacheConfig,
    pub rotation: RotationConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// What to look for and how deep to look
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// URL, host or any substring of the indexed website.
    ///
    /// Including the scheme (`http://`) avoids false positives such as
    /// `http://alexa.com/siteinfo/example.com`.
    pub site: String,

    /// Keywords to check the rank for
    pub keywords: Vec<String>,

    /// Number of result pages to check per keyword before giving up
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// 10 (accurate ranks) or 100 (fewer requests, less accurate)
    #[serde(rename = "results-per-page", default = "default_results_per_page")]
    pub results_per_page: u32,

    /// Whether the search engine should filter similar results
    #[serde(default = "default_true")]
    pub filter: bool,

    /// Stop paginating a keyword once the site has been found
    #[serde(rename = "stop-when-found", default)]
    pub stop_when_found: bool,
}

impl TargetConfig {
    /// Returns the page size mode for this configuration
    ///
    /// Falls back to ten results per page for values validation would reject.
    pub fn page_size(&self) -> PageSize {
        PageSize::from_count(self.results_per_page).unwrap_or(PageSize::Ten)
    }
}

/// Country and language of the result set
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Locale {
    /// Country code, `global` for the worldwide result set
    #[serde(default = "default_country")]
    pub country: String,

    /// Interface language code
    #[serde(default = "default_language")]
    pub language: String,

    /// Search engine host, derived from the country when absent
    #[serde(default)]
    pub domain: Option<String>,
}

impl Locale {
    pub fn new(country: &str, language: &str) -> Self {
        Self {
            country: country.to_string(),
            language: language.to_string(),
            domain: None,
        }
    }

    /// The search engine host to query for this locale
    pub fn search_domain(&self) -> String {
        if let Some(domain) = &self.domain {
            return domain.clone();
        }

        country_domain(&self.country)
            .unwrap_or(GLOBAL_DOMAIN)
            .to_string()
    }
}

const GLOBAL_DOMAIN: &str = "www.google.com";

/// Search engine host per country code
const COUNTRY_DOMAINS: &[(&str, &str)] = &[
    ("global", GLOBAL_DOMAIN),
    ("com", GLOBAL_DOMAIN),
    ("us", GLOBAL_DOMAIN),
    ("ae", "www.google.ae"),
    ("ar", "www.google.com.ar"),
    ("at", "www.google.at"),
    ("au", "www.google.com.au"),
    ("bd", "www.google.com.bd"),
    ("be", "www.google.be"),
    ("bg", "www.google.bg"),
    ("br", "www.google.com.br"),
    ("ca", "www.google.ca"),
    ("ch", "www.google.ch"),
    ("cl", "www.google.cl"),
    ("co", "www.google.com.co"),
    ("cz", "www.google.cz"),
    ("de", "www.google.de"),
    ("dk", "www.google.dk"),
    ("ee", "www.google.ee"),
    ("eg", "www.google.com.eg"),
    ("es", "www.google.es"),
    ("fi", "www.google.fi"),
    ("fr", "www.google.fr"),
    ("gb", "www.google.co.uk"),
    ("gr", "www.google.gr"),
    ("hk", "www.google.com.hk"),
    ("hr", "www.google.hr"),
    ("hu", "www.google.hu"),
    ("id", "www.google.co.id"),
    ("ie", "www.google.ie"),
    ("il", "www.google.co.il"),
    ("in", "www.google.co.in"),
    ("is", "www.google.is"),
    ("it", "www.google.it"),
    ("jp", "www.google.co.jp"),
    ("ke", "www.google.co.ke"),
    ("kr", "www.google.co.kr"),
    ("lt", "www.google.lt"),
    ("lu", "www.google.lu"),
    ("lv", "www.google.lv"),
    ("ma", "www.google.co.ma"),
    ("mx", "www.google.com.mx"),
    ("my", "www.google.com.my"),
    ("ng", "www.google.com.ng"),
    ("nl", "www.google.nl"),
    ("no", "www.google.no"),
    ("nz", "www.google.co.nz"),
    ("pe", "www.google.com.pe"),
    ("ph", "www.google.com.ph"),
    ("pk", "www.google.com.pk"),
    ("pl", "www.google.pl"),
    ("pt", "www.google.pt"),
    ("ro", "www.google.ro"),
    ("rs", "www.google.rs"),
    ("ru", "www.google.ru"),
    ("sa", "www.google.com.sa"),
    ("se", "www.google.se"),
    ("sg", "www.google.com.sg"),
    ("si", "www.google.si"),
    ("sk", "www.google.sk"),
    ("th", "www.google.co.th"),
    ("tr", "www.google.com.tr"),
    ("tw", "www.google.com.tw"),
    ("ua", "www.google.com.ua"),
    ("uk", "www.google.co.uk"),
    ("vn", "www.google.com.vn"),
    ("za", "www.google.co.za"),
];

/// Looks up the search engine host for a country code
///
/// Returns `None` for codes without a known country domain.
pub fn country_domain(country: &str) -> Option<&'static str> {
    let country = country.to_ascii_lowercase();
    COUNTRY_DOMAINS
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, domain)| *domain)
}

impl Default for Locale {
    fn default() -> Self {
        Self::new(&default_country(), &default_language())
    }
}

/// Number of results requested per page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSize {
    Ten,
    Hundred,
}

impl PageSize {
    pub fn from_count(count: u32) -> Option<Self> {
        match count {
            10 => Some(Self::Ten),
            100 => Some(Self::Hundred),
            _ => None,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Hundred => 100,
        }
    }

    /// Result offset of the first entry on the given page
    pub fn offset(&self, page_index: u32) -> u32 {
        page_index * self.count()
    }
}

/// How the page cache is consulted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Use cache entries younger than 24 hours
    #[default]
    Normal,
    /// Use cache entries regardless of age
    Force,
    /// Never read the cache (entries are still written)
    Bypass,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mode: CacheMode,
}

/// Proxy rotation service credentials and endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Service portal, `int` or `us`
    #[serde(default = "default_portal")]
    pub portal: String,

    /// API host, derived from the portal when absent
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_rotation_port")]
    pub port: u16,

    #[serde(rename = "user-id")]
    pub user_id: String,

    pub password: String,
}

impl RotationConfig {
    pub fn api_host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("{}.seo-proxies.com", self.portal))
    }
}

/// Retry budgets and pauses
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Failed fetches tolerated per keyword before it is skipped
    #[serde(rename = "keyword-error-budget", default = "default_keyword_budget")]
    pub keyword_error_budget: u32,

    /// Skipped keywords tolerated before the run aborts
    #[serde(rename = "run-error-budget", default = "default_run_budget")]
    pub run_error_budget: u32,

    #[serde(rename = "rotation-attempts", default = "default_rotation_attempts")]
    pub rotation_attempts: u32,

    #[serde(rename = "rotation-backoff-secs", default = "default_rotation_backoff")]
    pub rotation_backoff_secs: u64,

    /// Pause after a failed fetch, before control returns to the run loop
    #[serde(rename = "fetch-error-pause-secs", default = "default_fetch_pause")]
    pub fetch_error_pause_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            keyword_error_budget: default_keyword_budget(),
            run_error_budget: default_run_budget(),
            rotation_attempts: default_rotation_attempts(),
            rotation_backoff_secs: default_rotation_backoff(),
            fetch_error_pause_secs: default_fetch_pause(),
        }
    }
}

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the page cache and the identity usage store
    #[serde(rename = "working-dir", default = "default_working_dir")]
    pub working_dir: String,

    /// List every ranked result, not only the target's
    #[serde(rename = "show-all-ranks", default = "default_true")]
    pub show_all_ranks: bool,

    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            show_all_ranks: true,
            format: ReportFormat::Text,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_results_per_page() -> u32 {
    10
}

fn default_country() -> String {
    "global".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_portal() -> String {
    "int".to_string()
}

fn default_rotation_port() -> u16 {
    80
}

fn default_keyword_budget() -> u32 {
    5
}

fn default_run_budget() -> u32 {
    3
}

fn default_rotation_attempts() -> u32 {
    3
}

fn default_rotation_backoff() -> u64 {
    21
}

fn default_fetch_pause() -> u64 {
    3
}

fn default_working_dir() -> String {
    "./wd_rank_checker".to_string()
}
