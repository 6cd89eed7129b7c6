//! State module for task and URL lifecycles
//!
//! # Components
//!
//! - `TaskStatus`: Lifecycle of a crawl task and its legal transitions
//! - `LinkStatus`: Whether a discovered URL passed the pattern filter
//! - `CrawlStatus`: Content crawl progress of a discovered URL

mod task_state;
mod url_state;

// Re-export main types
pub use task_state::TaskStatus;
pub use url_state::{CrawlStatus, LinkStatus};
