//! Task runner - main crawl orchestration logic
//!
//! This module contains the crawl loop of a single task:
//! - Recovering URLs left in progress by an interrupted run
//! - Seeding the frontier on the first run
//! - Pulling bounded batches and filtering them against the task patterns
//! - Fetching with bounded concurrency and retry
//! - Persisting documents, statuses and newly discovered links
//! - Detecting completion, pause and cancellation

use crate::config::RunnerSettings;
use crate::crawler::{ContentFetcher, FetchError, FetchedPage, Frontier, RetryPolicy};
use crate::state::{CrawlStatus, TaskStatus};
use crate::storage::{lock_storage, DocumentBody, SharedStorage, StorageError, TaskRecord};
use crate::url::{normalize_url, UrlFilter};
use crate::MarkdocError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Why a runner stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The frontier drained and the task moved to `completed`
    Completed,
    /// The task was paused; the frontier is kept for a later resume
    Paused,
    /// The task was cancelled; results so far are kept
    Cancelled,
    /// The task was marked `failed` by another writer
    Failed,
}

impl RunOutcome {
    fn from_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(Self::Completed),
            TaskStatus::Paused => Some(Self::Paused),
            TaskStatus::Cancelled => Some(Self::Cancelled),
            TaskStatus::Failed => Some(Self::Failed),
            TaskStatus::Pending | TaskStatus::Running => None,
        }
    }
}

/// Result of fetching one URL, possibly after several attempts
struct FetchAttempt {
    url: String,
    attempts: u32,
    result: Result<FetchedPage, FetchError>,
}

/// Drives one task from `running` to a stop
///
/// The task must already be `running` when [`TaskRunner::run`] is called.
/// The runner is the only writer of its task's URLs and documents while it
/// is alive.
pub struct TaskRunner {
    task_id: i64,
    storage: SharedStorage,
    fetcher: Arc<dyn ContentFetcher>,
    settings: RunnerSettings,
    retry: RetryPolicy,
}

impl TaskRunner {
    pub fn new(
        task_id: i64,
        storage: SharedStorage,
        fetcher: Arc<dyn ContentFetcher>,
        settings: RunnerSettings,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&settings);
        Self {
            task_id,
            storage,
            fetcher,
            settings,
            retry,
        }
    }

    /// Runs the crawl loop until the task leaves `running`
    ///
    /// Any error is systemic: the task is moved to `failed` (best effort)
    /// and the error returned. Documents and URL statuses written so far are
    /// kept, and the counters keep their last stored values.
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome)` - Why the runner stopped
    /// * `Err(MarkdocError)` - A systemic failure
    pub async fn run(self) -> Result<RunOutcome, MarkdocError> {
        match self.crawl().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Task {} failed: {}", self.task_id, e);
                self.mark_failed();
                Err(e)
            }
        }
    }

    async fn crawl(&self) -> Result<RunOutcome, MarkdocError> {
        let task = self.load_task()?;
        if task.status != TaskStatus::Running {
            return Err(MarkdocError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Running,
            });
        }

        let seed = normalize_url(&task.seed_url)?;
        let filter = UrlFilter::new(&seed, &task.config)?;
        let selector = task.config.selector();
        let crawl_content = task.config.crawl_content;
        let frontier = Frontier::new(self.storage.clone(), self.task_id);

        let recovered = frontier.reset_interrupted()?;
        if recovered > 0 {
            tracing::info!(
                "Task {}: returned {} interrupted URLs to the frontier",
                self.task_id,
                recovered
            );
        }

        if frontier.is_empty()? {
            tracing::info!("Task {}: seeding frontier with {}", self.task_id, seed);
            frontier.enqueue(seed.as_str(), &task.title)?;
        }

        tracing::info!("Starting crawl of task {} ({})", self.task_id, task.title);
        let start_time = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(
            self.settings.max_concurrent_fetches.max(1) as usize,
        ));

        loop {
            let status = self.load_task()?.status;
            if let Some(outcome) = RunOutcome::from_status(status) {
                tracing::info!(
                    "Task {} stopped ({}) after {:?}",
                    self.task_id,
                    status,
                    start_time.elapsed()
                );
                return Ok(outcome);
            }

            let batch = frontier.next_batch(self.settings.batch_size.max(1))?;

            if batch.is_empty() {
                // Every fetch of the last batch was persisted before this point
                let completed = lock_storage(&self.storage)?.update_task_status(
                    self.task_id,
                    TaskStatus::Running,
                    TaskStatus::Completed,
                )?;
                if completed {
                    let counters = frontier.refresh_counters()?;
                    tracing::info!(
                        "Task {} completed: {} discovered, {} crawled, {} failed, {} skipped in {:?}",
                        self.task_id,
                        counters.discovered,
                        counters.crawled,
                        counters.failed,
                        counters.skipped,
                        start_time.elapsed()
                    );
                    return Ok(RunOutcome::Completed);
                }
                continue;
            }

            let mut in_flight = JoinSet::new();

            for record in batch {
                if record.url != seed.as_str() && !filter.matches(&record.url) {
                    tracing::debug!("Task {}: {} rejected by patterns", self.task_id, record.url);
                    frontier.mark_rejected(&record.url)?;
                    continue;
                }

                frontier.mark_in_progress(&record.url)?;

                let fetcher = self.fetcher.clone();
                let retry = self.retry.clone();
                let semaphore = semaphore.clone();
                let selector = selector.clone();
                in_flight.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    fetch_with_retry(
                        fetcher.as_ref(),
                        record.url,
                        selector.as_deref(),
                        crawl_content,
                        &retry,
                    )
                    .await
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                let attempt = joined.map_err(|e| {
                    tracing::error!("Task {}: fetch worker died: {}", self.task_id, e);
                    MarkdocError::RunnerAborted(self.task_id)
                })?;
                self.persist(&frontier, &filter, crawl_content, attempt)?;
            }

            let counters = frontier.refresh_counters()?;
            tracing::info!(
                "Task {} progress: {} discovered, {} crawled, {} failed",
                self.task_id,
                counters.discovered,
                counters.crawled,
                counters.failed
            );

            if self.settings.politeness_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.politeness_delay_ms)).await;
            }
        }
    }

    /// Stores the outcome of one fetch
    fn persist(
        &self,
        frontier: &Frontier,
        filter: &UrlFilter,
        crawl_content: bool,
        attempt: FetchAttempt,
    ) -> Result<(), StorageError> {
        let FetchAttempt {
            url,
            attempts,
            result,
        } = attempt;

        match result {
            Ok(page) => {
                if crawl_content {
                    let body = DocumentBody::Content {
                        title: page.title,
                        markdown: page.content,
                    };
                    lock_storage(&self.storage)?.put_document(self.task_id, &url, &body, Utc::now())?;
                    frontier.mark_crawled(&url, CrawlStatus::Succeeded, attempts, None)?;
                } else {
                    frontier.mark_crawled(&url, CrawlStatus::Skipped, attempts, None)?;
                }

                let mut added = 0;
                for link in &page.links {
                    if filter.matches(&link.url) && frontier.enqueue(&link.url, &link.text)? {
                        added += 1;
                    }
                }
                tracing::debug!(
                    "Task {}: {} done, {} of {} links new",
                    self.task_id,
                    url,
                    added,
                    page.links.len()
                );
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    "Task {}: {} failed after {} attempt(s): {}",
                    self.task_id,
                    url,
                    attempts,
                    message
                );
                lock_storage(&self.storage)?.put_document(
                    self.task_id,
                    &url,
                    &DocumentBody::Error(message.clone()),
                    Utc::now(),
                )?;
                frontier.mark_crawled(&url, CrawlStatus::Failed, attempts, Some(&message))?;
            }
        }

        Ok(())
    }

    fn load_task(&self) -> Result<TaskRecord, MarkdocError> {
        let storage = lock_storage(&self.storage)?;
        storage
            .get_task(self.task_id)?
            .ok_or(MarkdocError::TaskNotFound(self.task_id))
    }

    /// Moves the task to `failed` if it is still running
    fn mark_failed(&self) {
        let result = lock_storage(&self.storage).and_then(|mut storage| {
            storage.update_task_status(self.task_id, TaskStatus::Running, TaskStatus::Failed)
        });
        if let Err(e) = result {
            tracing::warn!("Could not mark task {} as failed: {}", self.task_id, e);
        }
    }
}

/// Fetches a URL, retrying transient failures with backoff
async fn fetch_with_retry(
    fetcher: &dyn ContentFetcher,
    url: String,
    selector: Option<&str>,
    crawl_content: bool,
    retry: &RetryPolicy,
) -> FetchAttempt {
    let mut attempts = 0;

    loop {
        attempts += 1;

        let result = if crawl_content {
            fetcher.fetch(&url, selector).await
        } else {
            fetcher
                .discover_links(&url)
                .await
                .map(|links| FetchedPage {
                    title: None,
                    content: String::new(),
                    links,
                })
        };

        match result {
            Err(e) if retry.should_retry(attempts, &e) => {
                let delay = retry.delay_for(attempts, &e);
                tracing::debug!(
                    "Attempt {} for {} failed ({}), retrying in {:?}",
                    attempts,
                    url,
                    e.kind(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            result => {
                return FetchAttempt {
                    url,
                    attempts,
                    result,
                }
            }
        }
    }
}
