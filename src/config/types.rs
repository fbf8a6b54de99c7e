use serde::Deserialize;

/// Placeholder in `listing-url` replaced by the listing page number
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Crawl loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Listing page URL template, e.g. `https://fonts.example/list?page={page}`
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// First listing page number
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Maximum number of listing pages to walk in one run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Log a progress line every this many items
    #[serde(rename = "progress-every", default = "default_progress_every")]
    pub progress_every: u32,
}

impl CrawlerConfig {
    /// Listing URL for the given page number
    pub fn listing_page_url(&self, page: u32) -> String {
        self.listing_url.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Last listing page this configuration allows
    pub fn last_page(&self) -> u32 {
        self.start_page.saturating_add(self.max_pages.saturating_sub(1))
    }
}

/// Token bucket parameters
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Burst capacity
    #[serde(rename = "max-tokens")]
    pub max_tokens: f64,

    /// Average requests admitted per second
    #[serde(rename = "refill-per-second")]
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2.0,
            refill_per_second: 1.0,
        }
    }
}

/// Retry schedule for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
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

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
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

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// CSS selectors used to pull font data out of listing and detail pages
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Links from a listing page to font detail pages
    #[serde(rename = "item-link")]
    pub item_link: String,

    /// Presence marks that another listing page follows
    #[serde(rename = "next-page")]
    pub next_page: String,

    pub name: String,
    pub foundry: String,
    pub license: String,
    pub tag: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item_link: "a.font-card[href]".to_string(),
            next_page: "a[rel='next']".to_string(),
            name: "h1.font-name".to_string(),
            foundry: ".font-foundry".to_string(),
            license: ".font-license".to_string(),
            tag: ".font-tag".to_string(),
        }
    }
}

fn default_start_page() -> u32 {
    1
}

fn default_progress_every() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}
