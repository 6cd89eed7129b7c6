//! Export and reporting of finished tasks

use crate::common::*;
use markdoc::state::TaskStatus;
use markdoc::MarkdocError;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_export_writes_markdown_tree() {
    let fetcher = Arc::new(ScriptedFetcher::docs_site(3, &[2]));
    let registry = registry(memory_storage(), fetcher);

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let dir = TempDir::new().unwrap();
    let written = registry.export(task_id, dir.path()).unwrap();

    assert_eq!(
        written,
        vec![
            PathBuf::from("index.md"),
            PathBuf::from("Page 1.md"),
            PathBuf::from("Page 3.md"),
        ]
    );

    let index = fs::read_to_string(dir.path().join("index.md")).unwrap();
    assert_eq!(index, format!("# Content of {}\n", SEED));
    let page = fs::read_to_string(dir.path().join("Page 3.md")).unwrap();
    assert_eq!(page, format!("# Content of {}\n", page_url(3)));

    // Failed pages never reach the export
    assert!(!dir.path().join("Page 2.md").exists());
}

#[tokio::test]
async fn test_export_creates_missing_directory() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out").join("guide");
    let written = registry.export(task_id, &target).unwrap();

    assert_eq!(written.len(), 2);
    assert!(target.join("index.md").is_file());
}

#[tokio::test]
async fn test_export_of_pending_task_is_empty() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(1, &[])));
    let task_id = create_docs_task(&registry);

    let dir = TempDir::new().unwrap();
    assert!(registry.export(task_id, dir.path()).unwrap().is_empty());

    assert!(matches!(
        registry.export(task_id + 1, dir.path()),
        Err(MarkdocError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_report_lists_failures() {
    let registry = registry(memory_storage(), Arc::new(ScriptedFetcher::docs_site(4, &[4])));

    let task_id = create_docs_task(&registry);
    registry.start_task(task_id).await.unwrap();
    registry.wait(task_id).await.unwrap();
    assert_eq!(registry.task(task_id).unwrap().status, TaskStatus::Completed);

    let report = registry.report(task_id).unwrap();
    assert!(report.starts_with(&format!("# Task {}: Guide", task_id)));
    assert!(report.contains("- **Status**: completed"));
    assert!(report.contains("| Discovered | 5 | |"));
    assert!(report.contains("| Crawled | 4 | 80.0% |"));
    assert!(report.contains("## Failed URLs (1)"));
    assert!(report.contains(&page_url(4)));
}
