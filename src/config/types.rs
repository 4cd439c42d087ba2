use crate::crawler::Mode;
use serde::Deserialize;

/// Main configuration structure for Sumi-Chronicle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// The paginated source being archived
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// URL of the newest page; older pages are reached from here
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Earliest date an item could plausibly carry (YYYY-MM-DD)
    #[serde(rename = "earliest-date", default)]
    pub earliest_date: Option<String>,

    /// Inclusion keywords; an empty list accepts every item
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Traversal behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    /// Operating mode (incremental, bounded-historical, full-historical)
    #[serde(default)]
    pub mode: Mode,

    /// Minimum delay between the end of one request and the start of the next
    #[serde(rename = "page-delay-secs", default = "default_page_delay_secs")]
    pub page_delay_secs: f64,

    /// Overrides the mode's page cap
    #[serde(rename = "page-cap", default)]
    pub page_cap: Option<u32>,

    /// Attempts per URL before a retryable failure becomes fatal
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request timeout
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Fetch each candidate item's own page for date evidence and content
    #[serde(rename = "fetch-detail-pages", default)]
    pub fetch_detail_pages: bool,

    /// Maximum snippet length in characters
    #[serde(rename = "snippet-length", default = "default_snippet_length")]
    pub snippet_length: usize,

    /// Hold the per-source advisory lock for the duration of a run
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            page_delay_secs: default_page_delay_secs(),
            page_cap: None,
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_detail_pages: false,
            snippet_length: default_snippet_length(),
            exclusive: default_exclusive(),
        }
    }
}

fn default_page_delay_secs() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_snippet_length() -> usize {
    500
}

fn default_exclusive() -> bool {
    true
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the declared client identifier: `Name/Version (+URL; email)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional JSON-lines file receiving every accepted item
    #[serde(rename = "json-lines-path", default)]
    pub json_lines_path: Option<String>,

    /// Optional JSON export path used by `--export`
    #[serde(rename = "export-path", default)]
    pub export_path: Option<String>,
}
