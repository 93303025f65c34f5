//! SEO issue detection
//!
//! Issues are found in two passes: per page while the crawl streams, and over
//! the whole run once it has ended (duplicated titles and descriptions). The
//! orchestrator talks to detection through the [`ReportManager`] trait and to
//! the summary cache through [`CacheManager`].

mod cache;
mod rules;

pub use cache::{CacheManager, IssueCache};
pub use rules::page_issues;

use crate::crawler::PageReport;
use crate::storage::{CrawlRun, SqliteStorage};
use crate::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Kinds of SEO issue the auditor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueType {
    TitleMissing,
    DescriptionMissing,
    H1Missing,
    LangMissing,
    ImagesWithoutAlt,
    InvalidHeadingOrder,
    Noindex,
    Redirect,
    ClientError,
    ServerError,
    DuplicatedTitle,
    DuplicatedDescription,
}

impl IssueType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::TitleMissing => "title_missing",
            Self::DescriptionMissing => "description_missing",
            Self::H1Missing => "h1_missing",
            Self::LangMissing => "lang_missing",
            Self::ImagesWithoutAlt => "images_without_alt",
            Self::InvalidHeadingOrder => "invalid_heading_order",
            Self::Noindex => "noindex",
            Self::Redirect => "redirect",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
            Self::DuplicatedTitle => "duplicated_title",
            Self::DuplicatedDescription => "duplicated_description",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|issue| issue.to_db_string() == s)
    }

    pub fn all() -> [Self; 12] {
        [
            Self::TitleMissing,
            Self::DescriptionMissing,
            Self::H1Missing,
            Self::LangMissing,
            Self::ImagesWithoutAlt,
            Self::InvalidHeadingOrder,
            Self::Noindex,
            Self::Redirect,
            Self::ClientError,
            Self::ServerError,
            Self::DuplicatedTitle,
            Self::DuplicatedDescription,
        ]
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Number of issues of each type found in a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueCount {
    by_type: BTreeMap<IssueType, u64>,
}

impl IssueCount {
    pub fn add(&mut self, issue: IssueType, n: u64) {
        if n > 0 {
            *self.by_type.entry(issue).or_insert(0) += n;
        }
    }

    pub fn get(&self, issue: IssueType) -> u64 {
        self.by_type.get(&issue).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_type.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Non-zero counts in issue order
    pub fn iter(&self) -> impl Iterator<Item = (IssueType, u64)> + '_ {
        self.by_type.iter().map(|(issue, n)| (*issue, *n))
    }
}

/// Issue detection interface the crawl orchestrator depends on
#[async_trait]
pub trait ReportManager: Send + Sync {
    /// Detects and stores the issues of one crawled page
    async fn create_page_issues(
        &self,
        report: &PageReport,
        body: &str,
        headers: &HeaderMap,
        run: &CrawlRun,
    ) -> Result<()>;

    /// Detects cross-page issues once the run has ended and returns the
    /// run's final issue count
    async fn create_multipage_issues(&self, run: &CrawlRun) -> Result<IssueCount>;
}

/// Issue detection backed by the SQLite store
#[derive(Debug)]
pub struct IssueReporter {
    storage: Arc<SqliteStorage>,
    cache: Arc<IssueCache>,
}

impl IssueReporter {
    pub fn new(storage: Arc<SqliteStorage>, cache: Arc<IssueCache>) -> Self {
        Self { storage, cache }
    }
}

#[async_trait]
impl ReportManager for IssueReporter {
    async fn create_page_issues(
        &self,
        report: &PageReport,
        _body: &str,
        _headers: &HeaderMap,
        run: &CrawlRun,
    ) -> Result<()> {
        let issues = page_issues(report);
        if !issues.is_empty() {
            debug!("{} issues on {}", issues.len(), report.url);
        }
        self.storage
            .save_page_issues(run.id, &report.url_hash, &issues)?;
        Ok(())
    }

    async fn create_multipage_issues(&self, run: &CrawlRun) -> Result<IssueCount> {
        let titles = self.storage.duplicated_titles(run.id)?;
        for hash in &titles {
            self.storage
                .save_page_issues(run.id, hash, &[IssueType::DuplicatedTitle])?;
        }

        let descriptions = self.storage.duplicated_descriptions(run.id)?;
        for hash in &descriptions {
            self.storage
                .save_page_issues(run.id, hash, &[IssueType::DuplicatedDescription])?;
        }

        let count = self.storage.count_issues(run.id)?;
        self.cache.insert(run.id, count.clone());
        Ok(count)
    }
}
