//! Storage module for persisting crawl data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Site and crawl run records
//! - Page reports with their links, images, hreflangs and resources
//! - Issues and issue-count snapshots
//! - Removal of superseded run data

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Store, StorageError, StorageResult};

use crate::crawler::{CrawlOptions, PageReport};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> crate::Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A site to audit
#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    pub url: String,
    pub options: CrawlOptions,
}

impl Site {
    pub fn new(id: i64, url: impl Into<String>, options: CrawlOptions) -> Self {
        Self {
            id,
            url: url.into(),
            options,
        }
    }
}

/// One crawl run of a site and its aggregate counters
///
/// The orchestrator is the only writer: counters are updated once per page
/// report and the run is finalized once when the stream closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlRun {
    /// Zero for placeholder entries
    pub id: i64,
    pub site_id: i64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,

    pub total_urls: u64,
    pub blocked_by_robots: u64,
    pub noindex: u64,
    pub internal_follow_links: u64,
    pub internal_nofollow_links: u64,
    pub external_follow_links: u64,
    pub external_nofollow_links: u64,
    pub sponsored_links: u64,
    pub ugc_links: u64,

    pub robotstxt_exists: bool,
    pub sitemap_exists: bool,
    pub sitemap_is_blocked: bool,

    pub issues_total: u64,
}

impl CrawlRun {
    /// A "not yet run" entry used to pad crawl history
    pub fn placeholder(site_id: i64) -> Self {
        Self {
            site_id,
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == 0
    }

    /// Folds one page report into the aggregate counters
    pub fn record(&mut self, report: &PageReport) {
        self.total_urls += 1;

        if report.blocked_by_robots {
            self.blocked_by_robots += 1;
        }
        if report.noindex {
            self.noindex += 1;
        }

        for link in &report.internal_links {
            if link.nofollow {
                self.internal_nofollow_links += 1;
            } else {
                self.internal_follow_links += 1;
            }
        }

        for link in &report.external_links {
            if link.nofollow {
                self.external_nofollow_links += 1;
            } else {
                self.external_follow_links += 1;
            }
            if link.sponsored {
                self.sponsored_links += 1;
            }
            if link.ugc {
                self.ugc_links += 1;
            }
        }
    }

    /// Run duration, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end? - self.start?)
    }
}
