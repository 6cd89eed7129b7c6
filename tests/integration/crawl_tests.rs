//! End-to-end crawl runs through the registry

use crate::common::*;
use markdoc::config::TaskConfig;
use markdoc::crawler::RunOutcome;
use markdoc::state::{CrawlStatus, LinkStatus, TaskStatus};
use markdoc::storage::{lock_storage, share, Storage};
use markdoc::MarkdocError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[tokio::test]
async fn test_partial_failure_still_completes() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(9, &[3, 7]));
    let registry = registry(storage.clone(), fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    let outcome = registry.wait(task_id).await.unwrap();

    assert_eq!(outcome, Some(RunOutcome::Completed));

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.counters.discovered, 10);
    assert_eq!(task.counters.crawled, 8);
    assert_eq!(task.counters.failed, 2);
    assert!(task.started_at.is_some());
    assert!(task.finished_at.is_some());

    // Each failure keeps a readable error next to its status
    let failed = registry
        .list_urls(task_id, Some(CrawlStatus::Failed))
        .unwrap();
    assert_eq!(failed.len(), 2);
    for record in &failed {
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("empty content"));
    }

    // The external link never entered the frontier
    assert!(registry
        .url(task_id, "https://elsewhere.example.org/blog")
        .is_err());
}

#[tokio::test]
async fn test_seed_is_enqueued_with_title() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(2, &[]));
    let registry = registry(storage, fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let seed = registry.url(task_id, SEED).unwrap();
    assert_eq!(seed.link_text, "Guide");
    assert_eq!(seed.link_status, LinkStatus::Confirmed);
    assert_eq!(seed.crawl_status, CrawlStatus::Succeeded);

    let document = registry.document(task_id, SEED).unwrap();
    assert_eq!(document.title.as_deref(), Some("Guide"));
    assert_eq!(document.content, format!("# Content of {}\n", SEED));
}

#[tokio::test]
async fn test_rediscovered_links_are_deduplicated() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(4, &[]));
    let registry = registry(storage, fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    // Every page links back to the seed and to its neighbour
    let urls = registry.list_urls(task_id, None).unwrap();
    assert_eq!(urls.len(), 5);
    assert_eq!(fetcher.calls(), 5);

    // First non-empty text wins
    let page_2 = registry.url(task_id, &page_url(2)).unwrap();
    assert_eq!(page_2.link_text, "Page 2");
}

#[tokio::test]
async fn test_pause_and_resume_reach_same_documents() {
    // Uninterrupted reference run
    let reference_storage = memory_storage();
    let reference = registry(
        reference_storage.clone(),
        Arc::new(ScriptedFetcher::docs_site(9, &[5])),
    );
    let reference_id = create_docs_task(&reference);
    reference.start_task(reference_id).await.unwrap();
    reference.wait(reference_id).await.unwrap();

    // Same site, paused during the fourth fetch
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(9, &[5]));
    let hook_storage = storage.clone();
    fetcher.on_fetch(4, move || interrupt_running(&hook_storage, TaskStatus::Paused));
    let registry = registry(storage.clone(), fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Paused)
    );

    let paused = registry.task(task_id).unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert_eq!(paused.counters.crawled, 4);
    assert!(registry
        .list_urls(task_id, Some(CrawlStatus::InProgress))
        .unwrap()
        .is_empty());

    registry.resume_task(task_id).await.unwrap();
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Completed)
    );

    assert_eq!(
        document_set(&storage, task_id),
        document_set(&reference_storage, reference_id)
    );
    // Nothing fetched twice
    assert_eq!(fetcher.calls(), 10);
}

#[tokio::test]
async fn test_cancel_keeps_crawled_documents() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(9, &[]));
    let hook_storage = storage.clone();
    fetcher.on_fetch(3, move || {
        interrupt_running(&hook_storage, TaskStatus::Cancelled)
    });
    let registry = registry(storage.clone(), fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Cancelled)
    );

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.counters.crawled, 3);
    assert_eq!(document_set(&storage, task_id).len(), 3);
    assert_eq!(fetcher.calls(), 3);

    // Terminal: no way back to running
    assert!(matches!(
        registry.resume_task(task_id).await,
        Err(MarkdocError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_store_failure_fails_task() {
    let broken = Arc::new(AtomicBool::new(true));
    let storage = share(FailingStorage::new(broken));
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]));
    let registry = registry(storage.clone(), fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();

    let result = registry.wait(task_id).await;
    assert!(matches!(result, Err(MarkdocError::StoreUnavailable(_))));

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.finished_at.is_some());
    // Counters were never refreshed past their last good values
    assert_eq!(task.counters.discovered, 0);
}

#[tokio::test]
async fn test_links_only_task_skips_every_url() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]));
    let registry = registry(storage.clone(), fetcher);

    let config = TaskConfig {
        crawl_content: false,
        ..TaskConfig::default()
    };
    let task_id = registry.create_task("Guide", SEED, &config).unwrap();
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.counters.discovered, 4);
    assert_eq!(task.counters.skipped, 4);
    assert_eq!(task.counters.crawled, 0);

    let guard = lock_storage(&storage).unwrap();
    assert!(guard.list_documents(task_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_exclude_pattern_limits_crawl() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(4, &[]));
    let registry = registry(storage, fetcher.clone());

    let config = TaskConfig {
        exclude_patterns: vec!["/guide/page-3".to_string()],
        ..TaskConfig::default()
    };
    let task_id = registry.create_task("Guide", SEED, &config).unwrap();
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    assert!(registry.url(task_id, &page_url(3)).is_err());
    // page-4 is still reachable from the seed
    assert_eq!(
        registry.url(task_id, &page_url(4)).unwrap().crawl_status,
        CrawlStatus::Succeeded
    );
    assert_eq!(fetcher.calls(), 4);
}
