use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main settings structure for Markdoc
///
/// Every section is optional in the TOML file; missing keys take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub extraction: ExtractionSettings,
    pub runner: RunnerSettings,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentSettings,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "markdoc.db".to_string(),
        }
    }
}

/// External reader service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Base URL of the reader service; the target URL is appended as a path
    pub endpoint: String,

    /// Bearer token for the reader service
    #[serde(rename = "api-key")]
    pub api_key: Option<String>,

    /// Value of the `X-Engine` header
    pub engine: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://r.jina.ai".to_string(),
            api_key: None,
            engine: "browser".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Task runner behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Number of URLs claimed from the frontier per batch
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Maximum number of fetches in flight within one batch
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Attempts per URL for retryable errors, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt (milliseconds)
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single backoff (milliseconds)
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Pause between batches (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent_fetches: 3,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            politeness_delay_ms: 500,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentSettings {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,
}

impl Default for UserAgentSettings {
    fn default() -> Self {
        Self {
            crawler_name: "markdoc".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentSettings {
    /// Formats the `User-Agent` header value
    ///
    /// Format: `CrawlerName/Version` or `CrawlerName/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(url) => format!("{}/{} (+{})", self.crawler_name, self.crawler_version, url),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// How include/exclude rules are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    /// Plain string prefixes; rules starting with `/` are path prefixes
    #[default]
    Prefix,
    /// Regular expressions searched anywhere in the URL
    Regex,
}

impl FromStr for PatternMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefix" | "startswith" => Ok(Self::Prefix),
            "regex" | "regexp" => Ok(Self::Regex),
            other => Err(format!("unknown pattern mode '{}'", other)),
        }
    }
}

/// Per-task crawl configuration, stored as JSON alongside the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub pattern_mode: PatternMode,

    /// CSS selectors narrowing the extracted content; sent as one selector list
    pub content_selectors: Vec<String>,

    /// When false only link detection runs and URLs end up skipped
    pub crawl_content: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            pattern_mode: PatternMode::Prefix,
            content_selectors: Vec::new(),
            crawl_content: true,
        }
    }
}

impl TaskConfig {
    /// Joins the content selectors into a single CSS selector list
    ///
    /// Returns None when no selector is configured.
    pub fn selector(&self) -> Option<String> {
        let selectors: Vec<&str> = self
            .content_selectors
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if selectors.is_empty() {
            None
        } else {
            Some(selectors.join(", "))
        }
    }
}
