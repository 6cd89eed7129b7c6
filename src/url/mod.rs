//! URL handling module for Markdoc
//!
//! This module provides URL normalization and the include/exclude pattern
//! filter that decides which discovered URLs belong to a task.

mod matcher;
mod normalize;

// Re-export main functions
pub use matcher::UrlFilter;
pub use normalize::{normalize_url, resolve_url};
