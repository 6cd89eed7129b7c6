//! Storage module for persisting tasks, frontiers and documents
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Task rows with their status, timestamps and counters
//! - Discovered URLs (the frontier) with link and crawl statuses
//! - Extracted documents, cached by URL

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::TaskConfig;
use crate::state::{CrawlStatus, LinkStatus, TaskStatus};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by the registry and every task runner
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Opens (or creates) the SQLite database and wraps it for sharing
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SharedStorage> {
    Ok(share(SqliteStorage::new(path)?))
}

/// Wraps any storage backend into a [`SharedStorage`]
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks the shared storage
///
/// A poisoned lock means a writer panicked mid-operation; it is reported as
/// an unavailable store rather than propagated as a panic.
pub fn lock_storage(
    storage: &SharedStorage,
) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage
        .lock()
        .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
}

/// Aggregate URL counts of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub discovered: u64,
    pub crawled: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Represents a task in the database
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    pub seed_url: String,
    pub config: TaskConfig,
    pub status: TaskStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub updated_at: String,
    pub counters: TaskCounters,
}

/// Represents a discovered URL in the database
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub id: i64,
    pub task_id: i64,
    pub url: String,
    pub link_text: String,
    pub discovered_at: String,
    pub link_status: LinkStatus,
    pub crawl_status: CrawlStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
}

/// Represents a stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub task_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub size: u64,
    pub fetched_at: String,
    pub error_message: Option<String>,
}

/// What a fetch produced for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentBody {
    /// Extracted markdown
    Content {
        title: Option<String>,
        markdown: String,
    },
    /// Fetch failed; the content is cleared and the message kept
    Error(String),
}
