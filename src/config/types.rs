use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for catalog-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl pacing, concurrency and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Global cap on concurrent detail fetches
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Total attempts per detail reference, first try included
    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff before the first retry (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on any single backoff (milliseconds)
    #[serde(rename = "retry-max-delay-ms", default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Pause after each successful detail fetch (milliseconds)
    #[serde(rename = "delay-between-requests-ms", default = "default_delay_between_requests_ms")]
    pub delay_between_requests_ms: u64,

    /// Cooldown between consecutive batches (milliseconds)
    #[serde(rename = "delay-between-batches-ms", default = "default_delay_between_batches_ms")]
    pub delay_between_batches_ms: u64,

    /// Bound on every render wait (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause after navigation or a pagination click (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Listing pages per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Render contexts opened per batch
    #[serde(rename = "sessions-per-batch", default = "default_sessions_per_batch")]
    pub sessions_per_batch: u32,

    /// Rows per listing page requested from the site
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn delay_between_requests(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }

    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            delay_between_requests_ms: default_delay_between_requests_ms(),
            delay_between_batches_ms: default_delay_between_batches_ms(),
            timeout_ms: default_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            batch_size: default_batch_size(),
            sessions_per_batch: default_sessions_per_batch(),
            page_size: default_page_size(),
        }
    }
}

/// Target catalog layout
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Listing page URL; also the root relative detail hrefs resolve against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Substring every detail href must contain
    #[serde(rename = "detail-marker", default = "default_detail_marker")]
    pub detail_marker: String,

    /// Element that re-renders on every pagination step
    #[serde(rename = "content-root", default = "default_content_root")]
    pub content_root: String,

    /// The page-size `<select>`
    #[serde(rename = "page-size-select", default = "default_page_size_select")]
    pub page_size_select: String,

    /// Element holding the "... de N registros" summary text
    #[serde(rename = "info-selector", default = "default_info_selector")]
    pub info_selector: String,

    /// Numbered pagination buttons
    #[serde(rename = "pagination-button", default = "default_pagination_button")]
    pub pagination_button: String,

    /// Advance-control selectors, tried in order
    #[serde(rename = "next-selectors", default = "default_next_selectors")]
    pub next_selectors: Vec<String>,

    /// Listing link selectors, tried in order until one matches
    #[serde(rename = "link-selectors", default = "default_link_selectors")]
    pub link_selectors: Vec<String>,
}

impl SiteConfig {
    /// Site layout with every selector at its default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            detail_marker: default_detail_marker(),
            content_root: default_content_root(),
            page_size_select: default_page_size_select(),
            info_selector: default_info_selector(),
            pagination_button: default_pagination_button(),
            next_selectors: default_next_selectors(),
            link_selectors: default_link_selectors(),
        }
    }
}

/// WebDriver connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    #[serde(rename = "webdriver-url", default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// "chrome" or "firefox"
    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// How often waits re-check the page (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: default_headless(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated record files
    #[serde(rename = "results-dir", default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Explicit record file path; a timestamped name is used when absent
    #[serde(rename = "output-file", default)]
    pub output_file: Option<PathBuf>,

    /// Where to write the markdown run summary, if anywhere
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            output_file: None,
            summary_path: None,
        }
    }
}

fn default_max_concurrent() -> u32 {
    12
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    4000
}

fn default_retry_max_delay_ms() -> u64 {
    10000
}

fn default_delay_between_requests_ms() -> u64 {
    500
}

fn default_delay_between_batches_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> u32 {
    12
}

fn default_sessions_per_batch() -> u32 {
    4
}

fn default_page_size() -> u32 {
    100
}

fn default_detail_marker() -> String {
    "DetalhesEscola".to_string()
}

fn default_content_root() -> String {
    "#tabelabusca".to_string()
}

fn default_page_size_select() -> String {
    "select[name='tabelabusca_length']".to_string()
}

fn default_info_selector() -> String {
    "#tabelabusca_info".to_string()
}

fn default_pagination_button() -> String {
    ".paginate_button".to_string()
}

fn default_next_selectors() -> Vec<String> {
    vec![
        "a.paginate_button.next:not(.disabled)".to_string(),
        "a.next:not(.disabled)".to_string(),
        "a[class*='next']:not(.disabled)".to_string(),
    ]
}

fn default_link_selectors() -> Vec<String> {
    vec![
        "#tabelabusca tbody tr td a".to_string(),
        "table tbody tr td a".to_string(),
        ".dataTable tbody tr td a".to_string(),
    ]
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
