//! Integration tests for task execution
//!
//! These tests drive the task registry end-to-end against in-memory SQLite
//! and a scripted fetcher standing in for the reader service.

mod common;
mod crawl_tests;
mod export_tests;
mod lifecycle_tests;
