//! Shared fixtures: a scripted documentation site and a storage wrapper
//! that can be switched into failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use markdoc::config::{RunnerSettings, TaskConfig};
use markdoc::crawler::{ContentFetcher, DiscoveredLink, FetchError, FetchedPage};
use markdoc::state::{CrawlStatus, LinkStatus, TaskStatus};
use markdoc::storage::{
    lock_storage, share, DocumentBody, DocumentRecord, SharedStorage, SqliteStorage, Storage,
    StorageError, StorageResult, TaskCounters, TaskRecord, UrlRecord,
};
use markdoc::TaskRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const SEED: &str = "https://docs.example.com/guide";

pub fn page_url(n: usize) -> String {
    format!("{}/page-{}", SEED, n)
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// A documentation site served without any network
///
/// The seed links to `page-1` .. `page-N` plus one external link. Pages
/// listed as failing answer with an extraction failure until healed.
pub struct ScriptedFetcher {
    pages: HashMap<String, Vec<DiscoveredLink>>,
    failing: HashSet<String>,
    healed: AtomicBool,
    calls: AtomicUsize,
    hook: Mutex<Option<(usize, Hook)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedFetcher {
    pub fn docs_site(pages: usize, failing: &[usize]) -> Self {
        let mut site = HashMap::new();

        let mut seed_links: Vec<DiscoveredLink> = (1..=pages)
            .map(|n| DiscoveredLink {
                url: page_url(n),
                text: format!("Page {}", n),
            })
            .collect();
        seed_links.push(DiscoveredLink {
            url: "https://elsewhere.example.org/blog".to_string(),
            text: "Blog".to_string(),
        });
        site.insert(SEED.to_string(), seed_links);

        for n in 1..=pages {
            // Every page links back to the seed and to its neighbour
            let mut links = vec![DiscoveredLink {
                url: SEED.to_string(),
                text: "Home".to_string(),
            }];
            if n < pages {
                links.push(DiscoveredLink {
                    url: page_url(n + 1),
                    text: String::new(),
                });
            }
            site.insert(page_url(n), links);
        }

        Self {
            pages: site,
            failing: failing.iter().map(|n| page_url(*n)).collect(),
            healed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            hook: Mutex::new(None),
            gate: None,
        }
    }

    /// Blocks every fetch until the semaphore hands out a permit
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Runs `hook` during the `n`-th fetch, before its result is returned
    pub fn on_fetch(&self, n: usize, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some((n, Box::new(hook)));
    }

    /// Makes the failing pages succeed from now on
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, url: &str) -> Result<Vec<DiscoveredLink>, FetchError> {
        if self.failing.contains(url) && !self.healed.load(Ordering::SeqCst) {
            return Err(FetchError::ExtractionFailed(
                "reader returned empty content".to_string(),
            ));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::ExtractionFailed("page returned HTTP 404".to_string()))
    }

    async fn serve(&self, url: &str) -> Result<Vec<DiscoveredLink>, FetchError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.respond(url);

        if let Some((at, hook)) = self.hook.lock().unwrap().as_ref() {
            if *at == n {
                hook();
            }
        }
        result
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _selector: Option<&str>) -> Result<FetchedPage, FetchError> {
        let links = self.serve(url).await?;
        let title = if url == SEED {
            "Guide".to_string()
        } else {
            format!("Page {}", url.rsplit('-').next().unwrap_or_default())
        };
        Ok(FetchedPage {
            title: Some(title),
            content: format!("# Content of {}\n", url),
            links,
        })
    }

    async fn discover_links(&self, url: &str) -> Result<Vec<DiscoveredLink>, FetchError> {
        self.serve(url).await
    }
}

/// Fast settings: one URL per batch, one fetch at a time, no delays
pub fn test_settings() -> RunnerSettings {
    RunnerSettings {
        batch_size: 1,
        max_concurrent_fetches: 1,
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        politeness_delay_ms: 0,
    }
}

pub fn memory_storage() -> SharedStorage {
    share(SqliteStorage::new_in_memory().unwrap())
}

pub fn registry(storage: SharedStorage, fetcher: Arc<ScriptedFetcher>) -> TaskRegistry {
    TaskRegistry::new(storage, fetcher, test_settings())
}

/// Moves every running task to `to`, as a concurrent user would
pub fn interrupt_running(storage: &SharedStorage, to: TaskStatus) {
    let mut guard = lock_storage(storage).unwrap();
    for task in guard.list_tasks().unwrap() {
        if task.status == TaskStatus::Running {
            guard.update_task_status(task.id, TaskStatus::Running, to).unwrap();
        }
    }
}

pub fn create_docs_task(registry: &TaskRegistry) -> i64 {
    registry
        .create_task("Guide", SEED, &TaskConfig::default())
        .unwrap()
}

/// (url, content) of every stored document with content, sorted by URL
pub fn document_set(storage: &SharedStorage, task_id: i64) -> Vec<(String, String)> {
    let guard = lock_storage(storage).unwrap();
    let mut documents: Vec<_> = guard
        .list_documents(task_id)
        .unwrap()
        .into_iter()
        .filter(|d| d.error_message.is_none())
        .map(|d| (d.url, d.content))
        .collect();
    documents.sort();
    documents
}

/// SQLite storage whose document writes fail once `broken` is set
pub struct FailingStorage {
    inner: SqliteStorage,
    broken: Arc<AtomicBool>,
}

impl FailingStorage {
    pub fn new(broken: Arc<AtomicBool>) -> Self {
        Self {
            inner: SqliteStorage::new_in_memory().unwrap(),
            broken,
        }
    }
}

impl Storage for FailingStorage {
    fn create_task(
        &mut self,
        title: &str,
        seed_url: &str,
        config: &TaskConfig,
    ) -> StorageResult<i64> {
        self.inner.create_task(title, seed_url, config)
    }

    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>> {
        self.inner.get_task(task_id)
    }

    fn list_tasks(&self) -> StorageResult<Vec<TaskRecord>> {
        self.inner.list_tasks()
    }

    fn update_task_config(&mut self, task_id: i64, config: &TaskConfig) -> StorageResult<()> {
        self.inner.update_task_config(task_id, config)
    }

    fn update_task_status(
        &mut self,
        task_id: i64,
        expected: TaskStatus,
        status: TaskStatus,
    ) -> StorageResult<bool> {
        self.inner.update_task_status(task_id, expected, status)
    }

    fn update_task_counters(&mut self, task_id: i64, counters: &TaskCounters) -> StorageResult<()> {
        self.inner.update_task_counters(task_id, counters)
    }

    fn delete_task(&mut self, task_id: i64) -> StorageResult<bool> {
        self.inner.delete_task(task_id)
    }

    fn insert_url(&mut self, task_id: i64, url: &str, link_text: &str) -> StorageResult<bool> {
        self.inner.insert_url(task_id, url, link_text)
    }

    fn get_url(&self, task_id: i64, url: &str) -> StorageResult<Option<UrlRecord>> {
        self.inner.get_url(task_id, url)
    }

    fn list_urls(
        &self,
        task_id: i64,
        status: Option<CrawlStatus>,
    ) -> StorageResult<Vec<UrlRecord>> {
        self.inner.list_urls(task_id, status)
    }

    fn next_not_started(&self, task_id: i64, limit: u32) -> StorageResult<Vec<UrlRecord>> {
        self.inner.next_not_started(task_id, limit)
    }

    fn update_link_status(
        &mut self,
        task_id: i64,
        url: &str,
        status: LinkStatus,
    ) -> StorageResult<()> {
        self.inner.update_link_status(task_id, url, status)
    }

    fn update_crawl_status(
        &mut self,
        task_id: i64,
        url: &str,
        status: CrawlStatus,
        attempts: u32,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        self.inner
            .update_crawl_status(task_id, url, status, attempts, error_message)
    }

    fn reset_urls(&mut self, task_id: i64, from: CrawlStatus) -> StorageResult<u64> {
        self.inner.reset_urls(task_id, from)
    }

    fn reset_url(&mut self, task_id: i64, url: &str) -> StorageResult<bool> {
        self.inner.reset_url(task_id, url)
    }

    fn count_urls(&self, task_id: i64) -> StorageResult<TaskCounters> {
        self.inner.count_urls(task_id)
    }

    fn put_document(
        &mut self,
        task_id: i64,
        url: &str,
        body: &DocumentBody,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk I/O error".to_string()));
        }
        self.inner.put_document(task_id, url, body, fetched_at)
    }

    fn get_document(&self, task_id: i64, url: &str) -> StorageResult<Option<DocumentRecord>> {
        self.inner.get_document(task_id, url)
    }

    fn list_documents(&self, task_id: i64) -> StorageResult<Vec<DocumentRecord>> {
        self.inner.list_documents(task_id)
    }
}
