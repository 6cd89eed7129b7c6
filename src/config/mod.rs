//! Configuration module for Markdoc
//!
//! Two layers of configuration live here:
//!
//! - `Settings`: process-wide TOML settings (storage, reader service, runner
//!   limits, user agent). Every key has a default.
//! - `TaskConfig`: per-task crawl rules, stored as JSON with the task and
//!   validated once before the task may run.
//!
//! # Example
//!
//! ```no_run
//! use markdoc::config::load_settings;
//! use std::path::Path;
//!
//! let settings = load_settings(Path::new("markdoc.toml")).unwrap();
//! println!("Batch size: {}", settings.runner.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ExtractionSettings, PatternMode, RunnerSettings, Settings, StorageSettings, TaskConfig,
    UserAgentSettings,
};

// Re-export parser and validation functions
pub use parser::{compute_settings_hash, load_settings, load_settings_with_hash, parse_settings};
pub use validation::{validate_settings, validate_task, validate_task_config};
