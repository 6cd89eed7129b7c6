//! Task state machine, editing and re-crawl through the registry

use crate::common::*;
use markdoc::config::TaskConfig;
use markdoc::crawler::RunOutcome;
use markdoc::state::{CrawlStatus, TaskStatus};
use markdoc::{ConfigError, MarkdocError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[tokio::test]
async fn test_create_validates_configuration() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));

    let bad_regex = TaskConfig {
        include_patterns: vec!["docs/(".to_string()],
        pattern_mode: markdoc::config::PatternMode::Regex,
        ..TaskConfig::default()
    };
    assert!(matches!(
        registry.create_task("Guide", SEED, &bad_regex),
        Err(MarkdocError::Config(ConfigError::InvalidPattern(_)))
    ));

    let bad_selector = TaskConfig {
        content_selectors: vec!["div[".to_string()],
        ..TaskConfig::default()
    };
    assert!(matches!(
        registry.create_task("Guide", SEED, &bad_selector),
        Err(MarkdocError::Config(ConfigError::InvalidSelector(_)))
    ));

    assert!(matches!(
        registry.create_task("Guide", "not a url", &TaskConfig::default()),
        Err(MarkdocError::Config(ConfigError::InvalidUrl(_)))
    ));

    assert!(registry.list_tasks().unwrap().is_empty());
}

#[tokio::test]
async fn test_created_task_is_pending_with_normalized_seed() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));
    let task_id = registry
        .create_task(
            "  Guide ",
            "https://docs.example.com/guide/?utm_source=x#intro",
            &TaskConfig::default(),
        )
        .unwrap();

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.title, "Guide");
    assert_eq!(task.seed_url, SEED);
    assert!(task.started_at.is_none());
}

#[tokio::test]
async fn test_invalid_transitions_leave_state_unchanged() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));
    let task_id = create_docs_task(&registry);

    let err = registry.pause_task(task_id).unwrap_err();
    assert!(matches!(
        err,
        MarkdocError::InvalidTransition {
            from: TaskStatus::Pending,
            to: TaskStatus::Paused
        }
    ));
    assert!(matches!(
        registry.resume_task(task_id).await,
        Err(MarkdocError::InvalidTransition { .. })
    ));
    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Pending);

    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();
    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Completed);

    for result in [
        registry.pause_task(task_id),
        registry.cancel_task(task_id),
    ] {
        assert!(matches!(
            result,
            Err(MarkdocError::InvalidTransition {
                from: TaskStatus::Completed,
                ..
            })
        ));
    }
    assert!(matches!(
        registry.start_task(task_id).await,
        Err(MarkdocError::InvalidTransition { .. })
    ));
    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_cancel_pending_task() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));
    let task_id = create_docs_task(&registry);

    registry.cancel_task(task_id).unwrap();
    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.finished_at.is_some());
}

#[tokio::test]
async fn test_unknown_task() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));
    assert!(matches!(
        registry.task(42),
        Err(MarkdocError::TaskNotFound(42))
    ));
    assert!(matches!(
        registry.start_task(42).await,
        Err(MarkdocError::TaskNotFound(42))
    ));
}

#[tokio::test]
async fn test_delete_refused_while_running() {
    let gate = Arc::new(Semaphore::new(0));
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]).gated(gate.clone()));
    let registry = registry(storage, fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();

    assert!(matches!(
        registry.delete_task(task_id).await,
        Err(MarkdocError::TaskBusy { .. })
    ));

    // Configuration is frozen while running
    assert!(matches!(
        registry.update_config(task_id, &TaskConfig::default()),
        Err(MarkdocError::InvalidState { .. })
    ));

    registry.cancel_task(task_id).unwrap();
    gate.add_permits(100);
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Cancelled)
    );

    registry.delete_task(task_id).await.unwrap();
    assert!(matches!(
        registry.task(task_id),
        Err(MarkdocError::TaskNotFound(_))
    ));
    assert!(matches!(
        registry.list_urls(task_id, None),
        Err(MarkdocError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_resume_running_task_is_rejected_immediately() {
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]).gated(gate.clone()));
    let registry = registry(memory_storage(), fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();

    let resumed = tokio::time::timeout(Duration::from_secs(2), registry.resume_task(task_id))
        .await
        .expect("resume must not wait for the running crawl");
    assert!(matches!(
        resumed,
        Err(MarkdocError::InvalidTransition {
            from: TaskStatus::Running,
            to: TaskStatus::Running
        })
    ));

    let started = tokio::time::timeout(Duration::from_secs(2), registry.start_task(task_id))
        .await
        .expect("start must not wait for the running crawl");
    assert!(matches!(
        started,
        Err(MarkdocError::InvalidTransition { .. })
    ));
    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Running);

    // The live runner is still tracked
    registry.cancel_task(task_id).unwrap();
    gate.add_permits(100);
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Cancelled)
    );
}

#[tokio::test]
async fn test_recrawl_in_flight_url_is_refused() {
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]).gated(gate.clone()));
    let registry = registry(memory_storage(), fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();

    // The runner claims the seed before blocking on the gate
    tokio::time::timeout(Duration::from_secs(2), async {
        while registry
            .url(task_id, SEED)
            .map(|u| u.crawl_status != CrawlStatus::InProgress)
            .unwrap_or(true)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(matches!(
        registry.recrawl_url(task_id, SEED),
        Err(MarkdocError::TaskBusy { .. })
    ));
    assert_eq!(
        registry.url(task_id, SEED).unwrap().crawl_status,
        CrawlStatus::InProgress
    );

    registry.pause_task(task_id).unwrap();
    gate.add_permits(100);
    registry.wait(task_id).await.unwrap();
    // The seed was fetched exactly once
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        registry.url(task_id, SEED).unwrap().crawl_status,
        CrawlStatus::Succeeded
    );
}

#[tokio::test]
async fn test_recrawl_failed_after_pause() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(5, &[2, 4]));
    let hook_storage = storage.clone();
    // The seed plus all five pages have been fetched by the sixth call
    fetcher.on_fetch(6, move || interrupt_running(&hook_storage, TaskStatus::Paused));
    let registry = registry(storage, fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Paused)
    );
    assert_eq!(registry.task(task_id).unwrap().counters.failed, 2);

    // Failed URLs carry an error document
    let broken = registry.document(task_id, &page_url(2)).unwrap();
    assert!(broken.content.is_empty());
    assert!(broken.error_message.is_some());

    fetcher.heal();
    assert_eq!(registry.recrawl_failed(task_id).unwrap(), 2);
    let counters = registry.task(task_id).unwrap().counters;
    assert_eq!(counters.failed, 0);

    registry.resume_task(task_id).await.unwrap();
    assert_eq!(
        registry.wait(task_id).await.unwrap(),
        Some(RunOutcome::Completed)
    );

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.counters.crawled, 6);
    assert_eq!(task.counters.failed, 0);

    // Latest document wins
    let fixed = registry.document(task_id, &page_url(2)).unwrap();
    assert!(fixed.error_message.is_none());
    assert_eq!(fixed.content, format!("# Content of {}\n", page_url(2)));
}

#[tokio::test]
async fn test_recrawl_single_url_and_terminal_refusal() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(2, &[]));
    let hook_storage = storage.clone();
    fetcher.on_fetch(2, move || interrupt_running(&hook_storage, TaskStatus::Paused));
    let registry = registry(storage, fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    registry.recrawl_url(task_id, &page_url(1)).unwrap();
    assert_eq!(
        registry.url(task_id, &page_url(1)).unwrap().crawl_status,
        CrawlStatus::NotStarted
    );
    assert!(matches!(
        registry.recrawl_url(task_id, "https://docs.example.com/guide/unknown"),
        Err(MarkdocError::UrlNotFound { .. })
    ));

    registry.resume_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();
    // seed, page-1, page-1 again, page-2
    assert_eq!(fetcher.calls(), 4);

    assert!(matches!(
        registry.recrawl_failed(task_id),
        Err(MarkdocError::InvalidState {
            status: TaskStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_update_config_while_paused() {
    let storage = memory_storage();
    let fetcher = Arc::new(ScriptedFetcher::docs_site(4, &[]));
    let hook_storage = storage.clone();
    fetcher.on_fetch(1, move || interrupt_running(&hook_storage, TaskStatus::Paused));
    let registry = registry(storage, fetcher.clone());

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let invalid = TaskConfig {
        exclude_patterns: vec!["  ".to_string()],
        ..TaskConfig::default()
    };
    assert!(matches!(
        registry.update_config(task_id, &invalid),
        Err(MarkdocError::Config(_))
    ));

    // Already discovered pages that no longer match are rejected on resume
    let narrowed = TaskConfig {
        exclude_patterns: vec!["/guide/page-".to_string()],
        ..TaskConfig::default()
    };
    registry.update_config(task_id, &narrowed).unwrap();
    assert_eq!(registry.task(task_id).unwrap().config, narrowed);

    registry.resume_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let task = registry.task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.counters.crawled, 1);
    assert_eq!(task.counters.skipped, 4);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_shutdown_pauses_live_runners() {
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[]).gated(gate.clone()));
    let registry = registry(memory_storage(), fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();

    let releaser = {
        let gate = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            gate.add_permits(100);
        })
    };

    registry.shutdown().await;
    releaser.await.unwrap();

    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Paused);
    assert_eq!(registry.wait(task_id).await.unwrap(), None);
}
