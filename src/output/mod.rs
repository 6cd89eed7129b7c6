//! Output module for exporting documents and reporting task progress
//!
//! This module handles:
//! - Writing crawled documents as a markdown directory tree
//! - Generating markdown status reports of a task

mod archive;
mod report;

pub use archive::{export_task, relative_path, sanitize_filename};
pub use report::format_task_report;

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
