//! Content fetcher implementation
//!
//! This module handles all network access for a task:
//! - Retrieving the raw page to discover outbound links
//! - Asking the external reader service for the page as markdown
//! - Classifying failures into retryable and permanent kinds
//!
//! The runner only sees the [`ContentFetcher`] trait, so tests can swap the
//! network for a scripted fetcher.

use crate::config::{ExtractionSettings, UserAgentSettings};
use crate::crawler::parser::{extract_links, extract_title};
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A link found on a fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Normalized absolute URL
    pub url: String,
    /// Anchor text, whitespace collapsed; may be empty
    pub text: String,
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Page title from the reader service, else from the raw page
    pub title: Option<String>,
    /// Extracted markdown
    pub content: String,
    /// Outbound links of the raw page
    pub links: Vec<DiscoveredLink>,
}

/// Fetch failure kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, timeout or server-side failure; worth retrying
    #[error("network error: {0}")]
    Network(String),

    /// Throttled by the page or the reader service; retry after a backoff
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The page or the reader produced nothing usable
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// The URL cannot be fetched at all
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Returns true for the kinds the runner retries
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Short machine-readable name of the kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Retrieves page content and links
///
/// Implementations must be idempotent reads: fetching the same URL twice
/// has no side effect beyond the network calls.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches a page as markdown plus its outbound links
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute http(s) URL
    /// * `selector` - Optional CSS selector list narrowing the extracted content
    async fn fetch(&self, url: &str, selector: Option<&str>) -> Result<FetchedPage, FetchError>;

    /// Fetches only the outbound links of a page
    async fn discover_links(&self, url: &str) -> Result<Vec<DiscoveredLink>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent settings
/// * `timeout` - Per-request timeout
pub fn build_http_client(
    user_agent: &UserAgentSettings,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    data: ReaderData,
}

#[derive(Debug, Deserialize)]
struct ReaderData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Fetcher backed by a Jina-style reader service
///
/// The reader is called as `GET {endpoint}/{target-url}` and answers JSON
/// with the page title and markdown content.
pub struct ReaderFetcher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    engine: String,
}

impl ReaderFetcher {
    /// Creates a reader fetcher from settings
    ///
    /// # Returns
    ///
    /// * `Ok(ReaderFetcher)` - Client built
    /// * `Err(reqwest::Error)` - TLS backend or client configuration failed
    pub fn new(
        extraction: &ExtractionSettings,
        user_agent: &UserAgentSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, Duration::from_secs(extraction.timeout_secs))?;
        Ok(Self {
            client,
            endpoint: extraction.endpoint.trim_end_matches('/').to_string(),
            api_key: extraction.api_key.clone().filter(|k| !k.is_empty()),
            engine: extraction.engine.clone(),
        })
    }

    /// Downloads the raw page and returns its body and final URL
    async fn fetch_raw(&self, url: &Url) -> Result<(String, Url), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(classify_request_error)?;

        let response = check_status(response, "page")?;
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read page body: {}", e)))?;

        Ok((body, final_url))
    }

    /// Calls the reader service once
    async fn read(&self, url: &Url, selector: Option<&str>) -> Result<Response, FetchError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.endpoint, url))
            .header(header::ACCEPT, "application/json")
            .header("X-Return-Format", "markdown")
            .header("X-Engine", self.engine.as_str());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        if let Some(selector) = selector {
            request = request.header("X-Target-Selector", selector);
        }

        request.send().await.map_err(classify_request_error)
    }

    /// Extracts markdown through the reader, dropping the selector on a 422
    async fn extract(&self, url: &Url, selector: Option<&str>) -> Result<ReaderData, FetchError> {
        let mut response = self.read(url, selector).await?;

        if selector.is_some() && response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            tracing::warn!(
                "Selector {:?} not found on {}, retrying without selector",
                selector,
                url
            );
            response = self.read(url, None).await?;
        }

        let response = check_status(response, "reader")?;
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read reader response: {}", e)))?;

        let parsed: ReaderResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::ExtractionFailed(format!("malformed reader response: {}", e))
        })?;

        Ok(parsed.data)
    }
}

#[async_trait]
impl ContentFetcher for ReaderFetcher {
    async fn fetch(&self, url: &str, selector: Option<&str>) -> Result<FetchedPage, FetchError> {
        let target = parse_target(url)?;

        // Link detection and content extraction are independent; a page that
        // refuses plain clients only loses its links
        let (links, html) = match self.fetch_raw(&target).await {
            Ok((html, final_url)) => (extract_links(&html, &final_url), Some(html)),
            Err(e) if !e.is_retryable() => {
                tracing::warn!("Link detection failed for {}: {}", url, e);
                (Vec::new(), None)
            }
            Err(e) => return Err(e),
        };

        let data = self.extract(&target, selector).await?;
        let content = data.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(FetchError::ExtractionFailed(
                "reader returned empty content".to_string(),
            ));
        }

        let title = data
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| html.as_deref().and_then(extract_title));

        Ok(FetchedPage {
            title,
            content,
            links,
        })
    }

    async fn discover_links(&self, url: &str) -> Result<Vec<DiscoveredLink>, FetchError> {
        let target = parse_target(url)?;
        let (html, final_url) = self.fetch_raw(&target).await?;
        Ok(extract_links(&html, &final_url))
    }
}

/// Parses a fetch target, accepting only http(s) URLs with a host
fn parse_target(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FetchError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url,
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(FetchError::InvalidUrl(format!("{}: missing host", url)));
    }

    Ok(parsed)
}

/// Maps a response status onto the fetch error kinds
///
/// | Status | Result |
/// |--------|--------|
/// | 2xx | Ok |
/// | 429 | RateLimited (honours `Retry-After` seconds) |
/// | 5xx | Network |
/// | other | ExtractionFailed |
fn check_status(response: Response, source: &str) -> Result<Response, FetchError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited { retry_after });
    }

    if status.is_server_error() {
        return Err(FetchError::Network(format!(
            "{} returned HTTP {}",
            source,
            status.as_u16()
        )));
    }

    Err(FetchError::ExtractionFailed(format!(
        "{} returned HTTP {}",
        source,
        status.as_u16()
    )))
}

fn classify_request_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::InvalidUrl(e.to_string())
    } else if e.is_timeout() {
        FetchError::Network("request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Network(format!("connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}
