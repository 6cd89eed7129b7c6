//! Export of crawled documents as a markdown tree
//!
//! Directories mirror the URL path relative to the seed path, and each
//! document becomes one `.md` file named after its title.

use crate::output::{OutputError, OutputResult};
use crate::state::CrawlStatus;
use crate::storage::{Storage, TaskRecord};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Longest file stem written, in characters
const MAX_FILENAME_LENGTH: usize = 100;

/// Makes text safe for use as a file name
///
/// # Rules
///
/// - `/ \ : * |` become `-`
/// - `?` is removed
/// - `"` becomes `'`, `<` and `>` become `(` and `)`
/// - leading/trailing dots and spaces are trimmed
/// - at most 100 characters are kept
/// - empty results become `untitled`
pub fn sanitize_filename(text: &str) -> String {
    let replaced: String = text
        .chars()
        .filter(|c| *c != '?')
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '|' => '-',
            '"' => '\'',
            '<' => '(',
            '>' => ')',
            other => other,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    let truncated: String = trimmed.chars().take(MAX_FILENAME_LENGTH).collect();
    let truncated = truncated.trim();

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// Path segments of `page` below the seed path
///
/// Pages on another host, or outside the seed path, keep their full path.
fn relative_segments(seed: &Url, page: &Url) -> Vec<String> {
    let segments = |url: &Url| -> Vec<String> {
        url.path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    };

    let page_segments = segments(page);
    if seed.host_str() != page.host_str() {
        return page_segments;
    }

    let seed_segments = segments(seed);
    if page_segments.starts_with(&seed_segments) {
        page_segments[seed_segments.len()..].to_vec()
    } else {
        page_segments
    }
}

/// Relative export path of one document, without collision handling
///
/// The file name comes from the document title, else the link text, else the
/// last path segment. The seed page itself is `index.md`.
pub fn relative_path(seed: &Url, page: &Url, title: Option<&str>, link_text: &str) -> PathBuf {
    let segments = relative_segments(seed, page);

    let Some((last, dirs)) = segments.split_last() else {
        return PathBuf::from("index.md");
    };

    let name = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| Some(link_text.trim()).filter(|t| !t.is_empty()))
        .unwrap_or(last.as_str());

    let mut path: PathBuf = dirs.iter().map(|d| sanitize_filename(d)).collect();
    path.push(format!("{}.md", sanitize_filename(name)));
    path
}

/// Appends `_N` to the file stem until the path is unused
fn deduplicate(path: PathBuf, used: &HashSet<PathBuf>) -> PathBuf {
    if !used.contains(&path) {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let candidate = path.with_file_name(format!("{}_{}.md", stem, counter));
        if !used.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Writes every successfully crawled document of a task below `output_dir`
///
/// # Arguments
///
/// * `storage` - The storage backend holding the task
/// * `task` - The task to export
/// * `output_dir` - Target directory, created if missing
///
/// # Returns
///
/// * `Ok(Vec<PathBuf>)` - Written files, relative to `output_dir`, in discovery order
/// * `Err(OutputError)` - Storage or filesystem failure
pub fn export_task(
    storage: &dyn Storage,
    task: &TaskRecord,
    output_dir: &Path,
) -> OutputResult<Vec<PathBuf>> {
    let seed = Url::parse(&task.seed_url)
        .map_err(|e| OutputError::Format(format!("bad seed URL {}: {}", task.seed_url, e)))?;

    let link_texts: HashMap<String, String> = storage
        .list_urls(task.id, Some(CrawlStatus::Succeeded))?
        .into_iter()
        .map(|u| (u.url, u.link_text))
        .collect();

    fs::create_dir_all(output_dir)?;

    let mut used = HashSet::new();
    let mut written = Vec::new();

    for document in storage.list_documents(task.id)? {
        let Some(link_text) = link_texts.get(&document.url) else {
            continue;
        };
        if document.error_message.is_some() || document.content.is_empty() {
            continue;
        }

        let page = match Url::parse(&document.url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Skipping document with bad URL {}: {}", document.url, e);
                continue;
            }
        };

        let path = deduplicate(
            relative_path(&seed, &page, document.title.as_deref(), link_text),
            &used,
        );

        let target = output_dir.join(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, document.content.as_bytes())?;
        tracing::debug!("Exported {} to {}", document.url, target.display());

        used.insert(path.clone());
        written.push(path);
    }

    tracing::info!(
        "Exported {} documents of task {} to {}",
        written.len(),
        task.id,
        output_dir.display()
    );

    Ok(written)
}
