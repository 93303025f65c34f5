//! In-memory cache of issue summaries, keyed by run id

use crate::issues::IssueCount;
use crate::storage::CrawlRun;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Cache invalidation interface the crawl orchestrator depends on
#[async_trait]
pub trait CacheManager: Send + Sync {
    /// Drops any cached summary of a superseded run
    async fn remove_crawl_cache(&self, run: &CrawlRun);
}

#[derive(Debug, Default)]
pub struct IssueCache {
    entries: RwLock<HashMap<i64, IssueCount>>,
}

impl IssueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, crawl_id: i64, count: IssueCount) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(crawl_id, count);
    }

    pub fn get(&self, crawl_id: i64) -> Option<IssueCount> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&crawl_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheManager for IssueCache {
    async fn remove_crawl_cache(&self, run: &CrawlRun) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run.id);
        if removed.is_some() {
            debug!("Dropped cached issue summary of crawl {}", run.id);
        }
    }
}
