//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::config::TaskConfig;
use crate::state::{CrawlStatus, LinkStatus, TaskStatus};
use crate::storage::{DocumentBody, DocumentRecord, TaskCounters, TaskRecord, UrlRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All URL-level operations are scoped by task id; URLs of different tasks
/// never collide.
pub trait Storage {
    // ===== Task Management =====

    /// Creates a new task in the `pending` status
    ///
    /// # Returns
    ///
    /// The ID of the newly created task
    fn create_task(
        &mut self,
        title: &str,
        seed_url: &str,
        config: &TaskConfig,
    ) -> StorageResult<i64>;

    /// Gets a task by ID
    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>>;

    /// Lists all tasks, newest first
    fn list_tasks(&self) -> StorageResult<Vec<TaskRecord>>;

    /// Replaces the configuration of a task
    fn update_task_config(&mut self, task_id: i64, config: &TaskConfig) -> StorageResult<()>;

    /// Moves a task from `expected` to `status` (compare-and-set)
    ///
    /// Sets `started_at` on the first move to `running` and `finished_at` on a
    /// move to a terminal status.
    ///
    /// # Returns
    ///
    /// `true` if the row was in `expected` and has been updated, `false` if
    /// another writer changed the status first.
    fn update_task_status(
        &mut self,
        task_id: i64,
        expected: TaskStatus,
        status: TaskStatus,
    ) -> StorageResult<bool>;

    /// Stores the counters shown with the task
    fn update_task_counters(&mut self, task_id: i64, counters: &TaskCounters) -> StorageResult<()>;

    /// Deletes a task with its URLs and documents
    ///
    /// Returns `false` if the task did not exist.
    fn delete_task(&mut self, task_id: i64) -> StorageResult<bool>;

    // ===== Frontier Management =====

    /// Inserts a discovered URL unless the task already has it
    ///
    /// An existing URL keeps its record; only an empty link text is filled in
    /// from a later non-empty one.
    ///
    /// # Returns
    ///
    /// `true` if a new record was created
    fn insert_url(&mut self, task_id: i64, url: &str, link_text: &str) -> StorageResult<bool>;

    /// Gets a discovered URL
    fn get_url(&self, task_id: i64, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Lists URLs of a task in discovery order, optionally by crawl status
    fn list_urls(
        &self,
        task_id: i64,
        status: Option<CrawlStatus>,
    ) -> StorageResult<Vec<UrlRecord>>;

    /// Returns up to `limit` URLs still `not_started`, in discovery order
    fn next_not_started(&self, task_id: i64, limit: u32) -> StorageResult<Vec<UrlRecord>>;

    /// Records the pattern check outcome for a URL
    fn update_link_status(&mut self, task_id: i64, url: &str, status: LinkStatus)
        -> StorageResult<()>;

    /// Sets the crawl status, attempt count and error message of a URL
    fn update_crawl_status(
        &mut self,
        task_id: i64,
        url: &str,
        status: CrawlStatus,
        attempts: u32,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Moves every URL of the task in status `from` back to `not_started`
    ///
    /// Clears attempts and error messages. Returns the number of URLs reset.
    fn reset_urls(&mut self, task_id: i64, from: CrawlStatus) -> StorageResult<u64>;

    /// Moves a single URL back to `not_started`
    ///
    /// Returns `false` if the URL is unknown for the task or `in_progress`.
    fn reset_url(&mut self, task_id: i64, url: &str) -> StorageResult<bool>;

    /// Counts URLs of a task by crawl status
    fn count_urls(&self, task_id: i64) -> StorageResult<TaskCounters>;

    // ===== Document Store =====

    /// Stores content or an error for a URL, replacing any previous document
    fn put_document(
        &mut self,
        task_id: i64,
        url: &str,
        body: &DocumentBody,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets the document stored for a URL
    fn get_document(&self, task_id: i64, url: &str) -> StorageResult<Option<DocumentRecord>>;

    /// Lists all documents of a task in discovery order of their URLs
    fn list_documents(&self, task_id: i64) -> StorageResult<Vec<DocumentRecord>>;
}
