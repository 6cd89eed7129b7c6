//! Registry of tasks and their live runners
//!
//! The registry is the single entry point for task lifecycle operations. It
//! owns the shared storage handle, the fetcher and the join handles of the
//! runners it spawned. At most one runner exists per task.

use crate::config::{validate_task, validate_task_config, RunnerSettings, Settings, TaskConfig};
use crate::crawler::{ContentFetcher, Frontier, ReaderFetcher, RunOutcome, TaskRunner};
use crate::output::{export_task, format_task_report};
use crate::state::{CrawlStatus, TaskStatus};
use crate::storage::{
    lock_storage, open_storage, DocumentRecord, SharedStorage, Storage, StorageResult,
    TaskRecord, UrlRecord,
};
use crate::url::normalize_url;
use crate::MarkdocError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type RunnerHandle = JoinHandle<Result<RunOutcome, MarkdocError>>;

/// Owns task lifecycle operations and the runners of a process
pub struct TaskRegistry {
    storage: SharedStorage,
    fetcher: Arc<dyn ContentFetcher>,
    settings: RunnerSettings,
    runners: Mutex<HashMap<i64, RunnerHandle>>,
}

impl TaskRegistry {
    pub fn new(
        storage: SharedStorage,
        fetcher: Arc<dyn ContentFetcher>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            storage,
            fetcher,
            settings,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a registry backed by SQLite and the reader service
    ///
    /// # Arguments
    ///
    /// * `settings` - Validated application settings
    ///
    /// # Returns
    ///
    /// * `Ok(TaskRegistry)` - Storage opened and HTTP client built
    /// * `Err(MarkdocError)` - The database or the client could not be set up
    pub fn from_settings(settings: &Settings) -> Result<Self, MarkdocError> {
        let storage = open_storage(Path::new(&settings.storage.database_path))?;
        let fetcher = ReaderFetcher::new(&settings.extraction, &settings.user_agent)?;
        Ok(Self::new(
            storage,
            Arc::new(fetcher),
            settings.runner.clone(),
        ))
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    fn with_storage<T>(
        &self,
        op: impl FnOnce(&mut (dyn Storage + Send + 'static)) -> StorageResult<T>,
    ) -> Result<T, MarkdocError> {
        let mut storage = lock_storage(&self.storage)?;
        Ok(op(&mut *storage)?)
    }

    // ===== Task Management =====

    /// Validates and stores a new task in the `pending` status
    ///
    /// The seed URL is stored normalized. Nothing is fetched until the task
    /// is started.
    pub fn create_task(
        &self,
        title: &str,
        seed_url: &str,
        config: &TaskConfig,
    ) -> Result<i64, MarkdocError> {
        let seed = validate_task(title, seed_url, config)?;
        let seed = normalize_url(seed.as_str())?;

        let task_id =
            self.with_storage(|s| s.create_task(title.trim(), seed.as_str(), config))?;
        tracing::info!("Created task {} ({}) for {}", task_id, title.trim(), seed);
        Ok(task_id)
    }

    /// Gets a task by ID
    pub fn task(&self, task_id: i64) -> Result<TaskRecord, MarkdocError> {
        self.with_storage(|s| s.get_task(task_id))?
            .ok_or(MarkdocError::TaskNotFound(task_id))
    }

    /// Lists all tasks, newest first
    pub fn list_tasks(&self) -> Result<Vec<TaskRecord>, MarkdocError> {
        self.with_storage(|s| s.list_tasks())
    }

    /// Replaces a task configuration
    ///
    /// Only pending or paused tasks can be edited; a paused task picks up the
    /// new configuration when resumed.
    pub fn update_config(&self, task_id: i64, config: &TaskConfig) -> Result<(), MarkdocError> {
        let task = self.task(task_id)?;
        if !task.status.is_editable() {
            return Err(MarkdocError::InvalidState {
                task_id,
                status: task.status,
                action: "reconfigure",
            });
        }

        let seed = normalize_url(&task.seed_url)?;
        validate_task_config(&seed, config)?;
        self.with_storage(|s| s.update_task_config(task_id, config))?;
        tracing::info!("Updated configuration of task {}", task_id);
        Ok(())
    }

    /// Deletes a task with its URLs and documents
    ///
    /// Refused with `TaskBusy` while the task is running or its runner has
    /// not stopped yet.
    pub async fn delete_task(&self, task_id: i64) -> Result<(), MarkdocError> {
        let mut runners = self.runners.lock().await;

        let task = self.task(task_id)?;
        if task.status == TaskStatus::Running {
            return Err(MarkdocError::TaskBusy {
                task_id,
                reason: "task is running".to_string(),
            });
        }
        if runners.get(&task_id).is_some_and(|h| !h.is_finished()) {
            return Err(MarkdocError::TaskBusy {
                task_id,
                reason: "runner is still finishing its batch".to_string(),
            });
        }

        runners.remove(&task_id);
        if !self.with_storage(|s| s.delete_task(task_id))? {
            return Err(MarkdocError::TaskNotFound(task_id));
        }
        tracing::info!("Deleted task {}", task_id);
        Ok(())
    }

    // ===== Lifecycle =====

    /// Starts a pending task
    pub async fn start_task(&self, task_id: i64) -> Result<(), MarkdocError> {
        self.launch(task_id, TaskStatus::Pending).await
    }

    /// Resumes a paused task from its stored frontier
    pub async fn resume_task(&self, task_id: i64) -> Result<(), MarkdocError> {
        self.launch(task_id, TaskStatus::Paused).await
    }

    /// Requests a running task to pause after its in-flight batch
    pub fn pause_task(&self, task_id: i64) -> Result<(), MarkdocError> {
        let from = self.set_status(task_id, TaskStatus::Paused)?;
        tracing::info!("Task {} paused (was {})", task_id, from);
        Ok(())
    }

    /// Cancels a task; in-flight fetches finish and are persisted
    pub fn cancel_task(&self, task_id: i64) -> Result<(), MarkdocError> {
        let from = self.set_status(task_id, TaskStatus::Cancelled)?;
        tracing::info!("Task {} cancelled (was {})", task_id, from);
        Ok(())
    }

    /// Moves a task to `to`, returning the status it left
    ///
    /// Retries the compare-and-set when another writer changed the status
    /// between the read and the write.
    fn set_status(&self, task_id: i64, to: TaskStatus) -> Result<TaskStatus, MarkdocError> {
        loop {
            let from = self.task(task_id)?.status;
            from.transition(to)?;
            if self.with_storage(|s| s.update_task_status(task_id, from, to))? {
                return Ok(from);
            }
        }
    }

    async fn launch(&self, task_id: i64, from: TaskStatus) -> Result<(), MarkdocError> {
        let mut runners = self.runners.lock().await;

        let task = self.task(task_id)?;
        if task.status != from {
            return Err(MarkdocError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Running,
            });
        }

        // A runner stopped by pause may still be finishing its batch. The
        // handle stays in the map until it resolves.
        if let Some(previous) = runners.get_mut(&task_id) {
            match previous.await {
                Ok(Ok(outcome)) => tracing::debug!("Previous runner of task {}: {:?}", task_id, outcome),
                Ok(Err(e)) => tracing::warn!("Previous runner of task {} failed: {}", task_id, e),
                Err(e) => tracing::warn!("Previous runner of task {} died: {}", task_id, e),
            }
            runners.remove(&task_id);
        }

        // Configuration may have changed while the previous runner stopped
        let task = self.task(task_id)?;
        let seed = normalize_url(&task.seed_url)?;
        validate_task_config(&seed, &task.config)?;

        if !self.with_storage(|s| s.update_task_status(task_id, from, TaskStatus::Running))? {
            let current = self.task(task_id)?.status;
            return Err(MarkdocError::InvalidTransition {
                from: current,
                to: TaskStatus::Running,
            });
        }

        let runner = TaskRunner::new(
            task_id,
            self.storage.clone(),
            self.fetcher.clone(),
            self.settings.clone(),
        );
        runners.insert(task_id, tokio::spawn(runner.run()));
        tracing::info!("Task {} running", task_id);
        Ok(())
    }

    /// Waits for the runner of a task to stop
    ///
    /// # Returns
    ///
    /// * `Ok(Some(RunOutcome))` - The runner stopped normally
    /// * `Ok(None)` - No runner was alive for the task
    /// * `Err(MarkdocError)` - The runner failed systemically or panicked
    pub async fn wait(&self, task_id: i64) -> Result<Option<RunOutcome>, MarkdocError> {
        let handle = self.runners.lock().await.remove(&task_id);
        match handle {
            Some(handle) => {
                let outcome = handle
                    .await
                    .map_err(|_| MarkdocError::RunnerAborted(task_id))??;
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    /// Pauses every live runner and waits for all of them to stop
    pub async fn shutdown(&self) {
        let handles: Vec<(i64, RunnerHandle)> = self.runners.lock().await.drain().collect();

        for (task_id, _) in &handles {
            match self.pause_task(*task_id) {
                Ok(()) | Err(MarkdocError::InvalidTransition { .. }) => {}
                Err(e) => tracing::warn!("Could not pause task {} on shutdown: {}", task_id, e),
            }
        }

        for (task_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => tracing::info!("Task {} stopped: {:?}", task_id, outcome),
                Ok(Err(e)) => tracing::warn!("Task {} stopped with error: {}", task_id, e),
                Err(e) => tracing::warn!("Runner of task {} died: {}", task_id, e),
            }
        }
    }

    // ===== URLs and Documents =====

    /// Lists discovered URLs of a task, optionally filtered by crawl status
    pub fn list_urls(
        &self,
        task_id: i64,
        status: Option<CrawlStatus>,
    ) -> Result<Vec<UrlRecord>, MarkdocError> {
        self.task(task_id)?;
        self.with_storage(|s| s.list_urls(task_id, status))
    }

    /// Gets one discovered URL with its status and error
    pub fn url(&self, task_id: i64, url: &str) -> Result<UrlRecord, MarkdocError> {
        let normalized = normalize_url(url)?;
        self.with_storage(|s| s.get_url(task_id, normalized.as_str()))?
            .ok_or_else(|| MarkdocError::UrlNotFound {
                task_id,
                url: normalized.to_string(),
            })
    }

    /// Gets the stored document of a URL
    pub fn document(&self, task_id: i64, url: &str) -> Result<DocumentRecord, MarkdocError> {
        let normalized = normalize_url(url)?;
        self.with_storage(|s| s.get_document(task_id, normalized.as_str()))?
            .ok_or_else(|| MarkdocError::UrlNotFound {
                task_id,
                url: normalized.to_string(),
            })
    }

    /// Puts one URL back into the frontier
    ///
    /// Allowed while the task is pending, running or paused. A running task
    /// picks the URL up in its next batch. A URL being fetched right now is
    /// refused with `TaskBusy`.
    pub fn recrawl_url(&self, task_id: i64, url: &str) -> Result<(), MarkdocError> {
        let frontier = self.recrawl_frontier(task_id)?;
        let record = self.url(task_id, url)?;
        let busy = || MarkdocError::TaskBusy {
            task_id,
            reason: format!("{} is being fetched", record.url),
        };
        if record.crawl_status == CrawlStatus::InProgress {
            return Err(busy());
        }
        // The runner may have claimed the URL since it was read
        if !frontier.reset_url(&record.url)? {
            return Err(busy());
        }
        frontier.refresh_counters()?;
        tracing::info!("Task {}: {} queued for re-crawl", task_id, record.url);
        Ok(())
    }

    /// Puts every failed URL of a task back into the frontier
    ///
    /// Returns the number of URLs reset.
    pub fn recrawl_failed(&self, task_id: i64) -> Result<u64, MarkdocError> {
        let frontier = self.recrawl_frontier(task_id)?;
        let reset = frontier.reset_failed()?;
        frontier.refresh_counters()?;
        tracing::info!("Task {}: {} failed URLs queued for re-crawl", task_id, reset);
        Ok(reset)
    }

    fn recrawl_frontier(&self, task_id: i64) -> Result<Frontier, MarkdocError> {
        let task = self.task(task_id)?;
        if task.status.is_terminal() {
            return Err(MarkdocError::InvalidState {
                task_id,
                status: task.status,
                action: "re-crawl",
            });
        }
        Ok(Frontier::new(self.storage.clone(), task_id))
    }

    // ===== Output =====

    /// Exports the successfully crawled documents of a task
    pub fn export(&self, task_id: i64, output_dir: &Path) -> Result<Vec<PathBuf>, MarkdocError> {
        let task = self.task(task_id)?;
        let storage = lock_storage(&self.storage)?;
        Ok(export_task(&*storage, &task, output_dir)?)
    }

    /// Markdown status report of a task
    pub fn report(&self, task_id: i64) -> Result<String, MarkdocError> {
        let task = self.task(task_id)?;
        let failed = self.with_storage(|s| s.list_urls(task_id, Some(CrawlStatus::Failed)))?;
        Ok(format_task_report(&task, &failed))
    }
}
