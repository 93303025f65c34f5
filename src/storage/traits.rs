//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::PageReport;
use crate::issues::IssueCount;
use crate::storage::{CrawlRun, Site};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence interface the crawl orchestrator depends on
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates a new run for `site`, stamped with the current time
    async fn save_crawl(&self, site: &Site) -> StorageResult<CrawlRun>;

    /// Persists one page report with its links, images and resources
    async fn save_page_report(&self, report: &PageReport, crawl_id: i64) -> StorageResult<()>;

    /// Persists the finalized counters and facts of a run
    async fn save_end_crawl(&self, run: &CrawlRun) -> StorageResult<()>;

    /// The `limit` most recent runs of a site, newest first
    async fn get_last_crawls(&self, site_id: i64, limit: usize) -> StorageResult<Vec<CrawlRun>>;

    /// The run two generations before the newest one, if any
    async fn get_previous_crawl(&self, site_id: i64) -> StorageResult<Option<CrawlRun>>;

    /// Deletes the page-level data of a run; the run record itself is kept
    async fn delete_crawl_data(&self, run: &CrawlRun) -> StorageResult<()>;

    /// Persists the issue-count snapshot of a run
    async fn save_issue_count(&self, crawl_id: i64, count: &IssueCount) -> StorageResult<()>;
}
