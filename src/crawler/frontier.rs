//! URL frontier of a task
//!
//! The frontier is not an in-memory queue: it is every `doc_urls` row of the
//! task whose crawl status is still `not_started`, read in discovery order.
//! This keeps pause, resume and crash recovery purely status based.

use crate::state::{CrawlStatus, LinkStatus};
use crate::storage::{lock_storage, SharedStorage, StorageResult, TaskCounters, UrlRecord};
use crate::url::normalize_url;

/// Frontier handle for one task
#[derive(Clone)]
pub struct Frontier {
    storage: SharedStorage,
    task_id: i64,
}

impl Frontier {
    pub fn new(storage: SharedStorage, task_id: i64) -> Self {
        Self { storage, task_id }
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    /// Adds a discovered URL to the frontier
    ///
    /// The URL is normalized first; URLs that do not normalize are dropped.
    ///
    /// # Returns
    ///
    /// `true` if the URL was new to the task
    pub fn enqueue(&self, url: &str, link_text: &str) -> StorageResult<bool> {
        let normalized = match normalize_url(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!("Dropping unnormalizable URL {}: {}", url, e);
                return Ok(false);
            }
        };

        let mut storage = lock_storage(&self.storage)?;
        storage.insert_url(self.task_id, normalized.as_str(), link_text.trim())
    }

    /// Returns up to `limit` URLs still waiting to be crawled
    pub fn next_batch(&self, limit: u32) -> StorageResult<Vec<UrlRecord>> {
        let storage = lock_storage(&self.storage)?;
        storage.next_not_started(self.task_id, limit)
    }

    /// Returns true if nothing was ever discovered for the task
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.counters()?.discovered == 0)
    }

    /// Confirms a URL against the task patterns and claims it for fetching
    pub fn mark_in_progress(&self, url: &str) -> StorageResult<()> {
        let mut storage = lock_storage(&self.storage)?;
        storage.update_link_status(self.task_id, url, LinkStatus::Confirmed)?;
        storage.update_crawl_status(self.task_id, url, CrawlStatus::InProgress, 0, None)
    }

    /// Records the final crawl outcome of a URL
    pub fn mark_crawled(
        &self,
        url: &str,
        status: CrawlStatus,
        attempts: u32,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let mut storage = lock_storage(&self.storage)?;
        storage.update_crawl_status(self.task_id, url, status, attempts, error_message)
    }

    /// Marks a URL as rejected by the task patterns; it will never be fetched
    pub fn mark_rejected(&self, url: &str) -> StorageResult<()> {
        let mut storage = lock_storage(&self.storage)?;
        storage.update_link_status(self.task_id, url, LinkStatus::RejectedByPattern)?;
        storage.update_crawl_status(
            self.task_id,
            url,
            CrawlStatus::Skipped,
            0,
            Some("rejected by URL patterns"),
        )
    }

    /// Returns URLs left `in_progress` by an interrupted runner to the frontier
    pub fn reset_interrupted(&self) -> StorageResult<u64> {
        let mut storage = lock_storage(&self.storage)?;
        storage.reset_urls(self.task_id, CrawlStatus::InProgress)
    }

    /// Puts every failed URL back into the frontier
    pub fn reset_failed(&self) -> StorageResult<u64> {
        let mut storage = lock_storage(&self.storage)?;
        storage.reset_urls(self.task_id, CrawlStatus::Failed)
    }

    /// Puts one URL back into the frontier
    ///
    /// Returns `false` if the task never discovered the URL or it is being
    /// fetched right now.
    pub fn reset_url(&self, url: &str) -> StorageResult<bool> {
        let mut storage = lock_storage(&self.storage)?;
        storage.reset_url(self.task_id, url)
    }

    /// Recounts the task's URLs and stores the result on the task row
    pub fn refresh_counters(&self) -> StorageResult<TaskCounters> {
        let mut storage = lock_storage(&self.storage)?;
        let counters = storage.count_urls(self.task_id)?;
        storage.update_task_counters(self.task_id, &counters)?;
        Ok(counters)
    }

    pub fn counters(&self) -> StorageResult<TaskCounters> {
        let storage = lock_storage(&self.storage)?;
        storage.count_urls(self.task_id)
    }
}
