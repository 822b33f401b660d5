use serde::Deserialize;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Crawl engine behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of items in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum time between any two outbound requests (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Failed attempts after which an item is no longer claimed
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Age after which a processing claim is considered abandoned (seconds)
    #[serde(rename = "stale-claim-secs", default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            stale_claim_secs: default_stale_claim_secs(),
        }
    }
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

/// How keys are turned into requests
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Template for keys that are not URLs; `{key}` is replaced by the
    /// percent-encoded key
    #[serde(rename = "url-template", default)]
    pub url_template: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url_template: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Entry page extraction
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(rename = "content-selector", default = "default_content_selector")]
    pub content_selector: String,

    #[serde(rename = "headword-selector", default = "default_headword_selector")]
    pub headword_selector: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(rename = "source-tag", default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            content_selector: default_content_selector(),
            headword_selector: default_headword_selector(),
            language: default_language(),
            source_tag: default_source_tag(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path the JSON export is written to
    #[serde(rename = "export-path")]
    pub export_path: String,
}

/// Where the initial work items come from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// Keys enqueued as-is (after normalization)
    #[serde(default)]
    pub keys: Vec<String>,

    /// Start points handed to letter-index discovery
    #[serde(default)]
    pub letters: Vec<String>,

    /// Index page template; `{code}` is replaced by the letter's code
    #[serde(rename = "index-url-template", default)]
    pub index_url_template: Option<String>,

    /// When set, index pages are fetched and the links under this selector
    /// become the seeds
    #[serde(rename = "link-selector", default)]
    pub link_selector: Option<String>,
}

fn default_concurrency() -> u32 {
    3
}

fn default_request_delay_ms() -> u64 {
    1200
}

fn default_max_retries() -> u32 {
    crate::crawler::DEFAULT_MAX_RETRIES
}

fn default_stale_claim_secs() -> u64 {
    600
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_content_selector() -> String {
    "div.text".to_string()
}

fn default_headword_selector() -> String {
    "a[name]".to_string()
}

fn default_language() -> String {
    "greek".to_string()
}

fn default_source_tag() -> String {
    "LSJ".to_string()
}
