//! Markdoc: a task-oriented documentation crawler
//!
//! This crate crawls documentation sites one task at a time. Each task has a
//! seed URL, include/exclude URL patterns and optional CSS selectors. Pages are
//! discovered through their links, converted to markdown by an external reader
//! service, and stored in SQLite for browsing and export.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod task;
pub mod url;

use thiserror::Error;

/// Main error type for Markdoc operations
#[derive(Debug, Error)]
pub enum MarkdocError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition {
        from: state::TaskStatus,
        to: state::TaskStatus,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("URL not found in task {task_id}: {url}")]
    UrlNotFound { task_id: i64, url: String },

    #[error("Task {task_id} is busy: {reason}")]
    TaskBusy { task_id: i64, reason: String },

    #[error("Cannot {action} task {task_id} while it is {status}")]
    InvalidState {
        task_id: i64,
        status: state::TaskStatus,
        action: &'static str,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Runner for task {0} panicked or was aborted")]
    RunnerAborted(i64),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid URL pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Markdoc operations
pub type Result<T> = std::result::Result<T, MarkdocError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Settings, TaskConfig};
pub use state::{CrawlStatus, LinkStatus, TaskStatus};
pub use task::TaskRegistry;
pub use crate::url::{normalize_url, UrlFilter};
