//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Markdoc database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl tasks
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    seed_url TEXT NOT NULL,
    config TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    updated_at TEXT NOT NULL,
    discovered_count INTEGER NOT NULL DEFAULT 0,
    crawled_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    skipped_count INTEGER NOT NULL DEFAULT 0
);

-- Discovered URLs; the frontier is every row still not_started
CREATE TABLE IF NOT EXISTS doc_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    link_text TEXT NOT NULL DEFAULT '',
    discovered_at TEXT NOT NULL,
    link_status TEXT NOT NULL,
    crawl_status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    updated_at TEXT,
    UNIQUE(task_id, url)
);

CREATE INDEX IF NOT EXISTS idx_doc_urls_frontier ON doc_urls(task_id, crawl_status, id);

-- Extracted documents, one per discovered URL
CREATE TABLE IF NOT EXISTS documents (
    task_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT,
    content TEXT NOT NULL DEFAULT '',
    size INTEGER NOT NULL DEFAULT 0,
    fetched_at TEXT NOT NULL,
    error_message TEXT,
    PRIMARY KEY (task_id, url),
    FOREIGN KEY (task_id, url) REFERENCES doc_urls(task_id, url) ON DELETE CASCADE
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
