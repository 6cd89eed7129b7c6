//! Markdown status reports of a task
//!
//! Used by the `status` command to show progress, counters and the URLs
//! that failed together with their errors.

use crate::storage::{TaskRecord, UrlRecord};

/// Failed URLs listed in a report before the rest is summarized
const MAX_LISTED_FAILURES: usize = 20;

/// Percentage of `part` in `total`, 0 for an empty total
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Formats a task as a markdown report
///
/// # Arguments
///
/// * `task` - The task with its stored counters
/// * `failed` - Failed URLs of the task, in discovery order
pub fn format_task_report(task: &TaskRecord, failed: &[UrlRecord]) -> String {
    let counters = task.counters;
    let mut md = String::new();

    md.push_str(&format!("# Task {}: {}\n\n", task.id, task.title));

    md.push_str("## Task Information\n\n");
    md.push_str(&format!("- **Seed URL**: {}\n", task.seed_url));
    md.push_str(&format!("- **Status**: {}\n", task.status));
    md.push_str(&format!("- **Created**: {}\n", task.created_at));
    if let Some(started) = &task.started_at {
        md.push_str(&format!("- **Started**: {}\n", started));
    }
    if let Some(finished) = &task.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if !task.config.include_patterns.is_empty() {
        md.push_str(&format!(
            "- **Include**: {}\n",
            task.config.include_patterns.join(", ")
        ));
    }
    if !task.config.exclude_patterns.is_empty() {
        md.push_str(&format!(
            "- **Exclude**: {}\n",
            task.config.exclude_patterns.join(", ")
        ));
    }
    if let Some(selector) = task.config.selector() {
        md.push_str(&format!("- **Selectors**: {}\n", selector));
    }
    md.push('\n');

    let pending = counters
        .discovered
        .saturating_sub(counters.crawled + counters.failed + counters.skipped);

    md.push_str("## Progress\n\n");
    md.push_str("| URLs | Count | Share |\n");
    md.push_str("|------|-------|-------|\n");
    md.push_str(&format!("| Discovered | {} | |\n", counters.discovered));
    for (label, count) in [
        ("Crawled", counters.crawled),
        ("Failed", counters.failed),
        ("Skipped", counters.skipped),
        ("Remaining", pending),
    ] {
        md.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            label,
            count,
            percentage(count, counters.discovered)
        ));
    }
    md.push('\n');

    if !failed.is_empty() {
        md.push_str(&format!("## Failed URLs ({})\n\n", failed.len()));
        for record in failed.iter().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "- {} ({} attempts): {}\n",
                record.url,
                record.attempts,
                record.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
        if failed.len() > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n... and {} more\n",
                failed.len() - MAX_LISTED_FAILURES
            ));
        }
    }

    md
}
