//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::config::TaskConfig;
use crate::state::{CrawlStatus, LinkStatus, TaskStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{DocumentBody, DocumentRecord, TaskCounters, TaskRecord, UrlRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const TASK_COLUMNS: &str = "id, title, seed_url, config, status, created_at, started_at,
     finished_at, updated_at, discovered_count, crawled_count, failed_count, skipped_count";

const URL_COLUMNS: &str = "id, task_id, url, link_text, discovered_at, link_status,
     crawl_status, attempts, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Wraps a column parse failure so it surfaces as a rusqlite error
fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let config_json: String = row.get(3)?;
    let config: TaskConfig = serde_json::from_str(&config_json)
        .map_err(|e| conversion_error(3, format!("invalid task config: {}", e)))?;

    let status_str: String = row.get(4)?;
    let status = TaskStatus::from_db_string(&status_str)
        .ok_or_else(|| conversion_error(4, format!("unknown task status '{}'", status_str)))?;

    Ok(TaskRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        seed_url: row.get(2)?,
        config,
        status,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        updated_at: row.get(8)?,
        counters: TaskCounters {
            discovered: row.get::<_, i64>(9)? as u64,
            crawled: row.get::<_, i64>(10)? as u64,
            failed: row.get::<_, i64>(11)? as u64,
            skipped: row.get::<_, i64>(12)? as u64,
        },
    })
}

fn url_from_row(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    let link_str: String = row.get(5)?;
    let link_status = LinkStatus::from_db_string(&link_str)
        .ok_or_else(|| conversion_error(5, format!("unknown link status '{}'", link_str)))?;

    let crawl_str: String = row.get(6)?;
    let crawl_status = CrawlStatus::from_db_string(&crawl_str)
        .ok_or_else(|| conversion_error(6, format!("unknown crawl status '{}'", crawl_str)))?;

    Ok(UrlRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        url: row.get(2)?,
        link_text: row.get(3)?,
        discovered_at: row.get(4)?,
        link_status,
        crawl_status,
        attempts: row.get(7)?,
        error_message: row.get(8)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        task_id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        fetched_at: row.get(5)?,
        error_message: row.get(6)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Task Management =====

    fn create_task(
        &mut self,
        title: &str,
        seed_url: &str,
        config: &TaskConfig,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let config_json = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO tasks (title, seed_url, config, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                title,
                seed_url,
                config_json,
                TaskStatus::Pending.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        let task = self
            .conn
            .query_row(&sql, params![task_id], task_from_row)
            .optional()?;
        Ok(task)
    }

    fn list_tasks(&self) -> StorageResult<Vec<TaskRecord>> {
        let sql = format!("SELECT {} FROM tasks ORDER BY id DESC", TASK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn update_task_config(&mut self, task_id: i64, config: &TaskConfig) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let config_json = serde_json::to_string(config)?;
        self.conn.execute(
            "UPDATE tasks SET config = ?1, updated_at = ?2 WHERE id = ?3",
            params![config_json, now, task_id],
        )?;
        Ok(())
    }

    fn update_task_status(
        &mut self,
        task_id: i64,
        expected: TaskStatus,
        status: TaskStatus,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let finished_at = status.is_terminal().then(|| now.clone());
        let changed = self.conn.execute(
            "UPDATE tasks SET
                status = ?1,
                updated_at = ?2,
                started_at = CASE WHEN ?1 = 'running' AND started_at IS NULL
                                  THEN ?2 ELSE started_at END,
                finished_at = COALESCE(?3, finished_at)
             WHERE id = ?4 AND status = ?5",
            params![
                status.to_db_string(),
                now,
                finished_at,
                task_id,
                expected.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }

    fn update_task_counters(&mut self, task_id: i64, counters: &TaskCounters) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE tasks SET discovered_count = ?1, crawled_count = ?2, failed_count = ?3,
             skipped_count = ?4 WHERE id = ?5",
            params![
                counters.discovered as i64,
                counters.crawled as i64,
                counters.failed as i64,
                counters.skipped as i64,
                task_id
            ],
        )?;
        Ok(())
    }

    fn delete_task(&mut self, task_id: i64) -> StorageResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(deleted == 1)
    }

    // ===== Frontier Management =====

    fn insert_url(&mut self, task_id: i64, url: &str, link_text: &str) -> StorageResult<bool> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT link_text FROM doc_urls WHERE task_id = ?1 AND url = ?2",
                params![task_id, url],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(current_text) = existing {
            if current_text.is_empty() && !link_text.is_empty() {
                self.conn.execute(
                    "UPDATE doc_urls SET link_text = ?1 WHERE task_id = ?2 AND url = ?3",
                    params![link_text, task_id, url],
                )?;
            }
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO doc_urls (task_id, url, link_text, discovered_at, link_status, crawl_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task_id,
                url,
                link_text,
                now,
                LinkStatus::Pending.to_db_string(),
                CrawlStatus::NotStarted.to_db_string()
            ],
        )?;
        Ok(true)
    }

    fn get_url(&self, task_id: i64, url: &str) -> StorageResult<Option<UrlRecord>> {
        let sql = format!(
            "SELECT {} FROM doc_urls WHERE task_id = ?1 AND url = ?2",
            URL_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![task_id, url], url_from_row)
            .optional()?;
        Ok(record)
    }

    fn list_urls(
        &self,
        task_id: i64,
        status: Option<CrawlStatus>,
    ) -> StorageResult<Vec<UrlRecord>> {
        let records = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM doc_urls WHERE task_id = ?1 AND crawl_status = ?2 ORDER BY id",
                    URL_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![task_id, status.to_db_string()], url_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM doc_urls WHERE task_id = ?1 ORDER BY id",
                    URL_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![task_id], url_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    fn next_not_started(&self, task_id: i64, limit: u32) -> StorageResult<Vec<UrlRecord>> {
        let sql = format!(
            "SELECT {} FROM doc_urls WHERE task_id = ?1 AND crawl_status = ?2 ORDER BY id LIMIT ?3",
            URL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![task_id, CrawlStatus::NotStarted.to_db_string(), limit],
                url_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn update_link_status(
        &mut self,
        task_id: i64,
        url: &str,
        status: LinkStatus,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE doc_urls SET link_status = ?1 WHERE task_id = ?2 AND url = ?3",
            params![status.to_db_string(), task_id, url],
        )?;
        Ok(())
    }

    fn update_crawl_status(
        &mut self,
        task_id: i64,
        url: &str,
        status: CrawlStatus,
        attempts: u32,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE doc_urls SET crawl_status = ?1, attempts = ?2, error_message = ?3,
             updated_at = ?4 WHERE task_id = ?5 AND url = ?6",
            params![
                status.to_db_string(),
                attempts,
                error_message,
                now,
                task_id,
                url
            ],
        )?;
        Ok(())
    }

    fn reset_urls(&mut self, task_id: i64, from: CrawlStatus) -> StorageResult<u64> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE doc_urls SET crawl_status = ?1, attempts = 0, error_message = NULL,
             updated_at = ?2 WHERE task_id = ?3 AND crawl_status = ?4",
            params![
                CrawlStatus::NotStarted.to_db_string(),
                now,
                task_id,
                from.to_db_string()
            ],
        )?;
        Ok(changed as u64)
    }

    fn reset_url(&mut self, task_id: i64, url: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE doc_urls SET crawl_status = ?1, link_status = ?2, attempts = 0,
             error_message = NULL, updated_at = ?3
             WHERE task_id = ?4 AND url = ?5 AND crawl_status != ?6",
            params![
                CrawlStatus::NotStarted.to_db_string(),
                LinkStatus::Pending.to_db_string(),
                now,
                task_id,
                url,
                CrawlStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }

    fn count_urls(&self, task_id: i64) -> StorageResult<TaskCounters> {
        let counters = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(crawl_status = 'succeeded'), 0),
                    COALESCE(SUM(crawl_status = 'failed'), 0),
                    COALESCE(SUM(crawl_status = 'skipped'), 0)
             FROM doc_urls WHERE task_id = ?1",
            params![task_id],
            |row| {
                Ok(TaskCounters {
                    discovered: row.get::<_, i64>(0)? as u64,
                    crawled: row.get::<_, i64>(1)? as u64,
                    failed: row.get::<_, i64>(2)? as u64,
                    skipped: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(counters)
    }

    // ===== Document Store =====

    fn put_document(
        &mut self,
        task_id: i64,
        url: &str,
        body: &DocumentBody,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let (title, content, error_message) = match body {
            DocumentBody::Content { title, markdown } => (title.as_deref(), markdown.as_str(), None),
            DocumentBody::Error(message) => (None, "", Some(message.as_str())),
        };

        self.conn.execute(
            "INSERT INTO documents (task_id, url, title, content, size, fetched_at, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(task_id, url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                size = excluded.size,
                fetched_at = excluded.fetched_at,
                error_message = excluded.error_message",
            params![
                task_id,
                url,
                title,
                content,
                content.len() as i64,
                fetched_at.to_rfc3339(),
                error_message
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, task_id: i64, url: &str) -> StorageResult<Option<DocumentRecord>> {
        let document = self
            .conn
            .query_row(
                "SELECT task_id, url, title, content, size, fetched_at, error_message
                 FROM documents WHERE task_id = ?1 AND url = ?2",
                params![task_id, url],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    fn list_documents(&self, task_id: i64) -> StorageResult<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.task_id, d.url, d.title, d.content, d.size, d.fetched_at, d.error_message
             FROM documents d
             JOIN doc_urls u ON u.task_id = d.task_id AND u.url = d.url
             WHERE d.task_id = ?1
             ORDER BY u.id",
        )?;
        let documents = stmt
            .query_map(params![task_id], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }
}
