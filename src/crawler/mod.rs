//! Crawler module for page fetching and task execution
//!
//! This module contains the core crawling logic, including:
//! - Fetching pages through the reader service
//! - HTML parsing and link extraction
//! - Retry with capped exponential backoff
//! - The per-task frontier and the runner loop

mod fetcher;
mod frontier;
mod parser;
mod retry;
mod runner;

pub use fetcher::{
    build_http_client, ContentFetcher, DiscoveredLink, FetchError, FetchedPage, ReaderFetcher,
};
pub use frontier::Frontier;
pub use parser::{extract_links, extract_title};
pub use retry::RetryPolicy;
pub use runner::{RunOutcome, TaskRunner};
