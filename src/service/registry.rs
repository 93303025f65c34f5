//! Registry of running crawls, at most one per site

use crate::crawler::Crawler;
use crate::{AuditError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Entries = HashMap<i64, Arc<Crawler>>;

/// Maps site ids to the engine currently crawling them
#[derive(Debug, Clone, Default)]
pub struct CrawlerRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `crawler` for `site_id`
    ///
    /// The duplicate check and the insert happen under one lock. The returned
    /// guard removes the entry when dropped.
    pub fn register(&self, site_id: i64, crawler: Arc<Crawler>) -> Result<RegistrationGuard> {
        let mut entries = self.lock();
        if entries.contains_key(&site_id) {
            return Err(AuditError::AlreadyCrawling { site_id });
        }
        entries.insert(site_id, crawler);
        debug!("Registered crawler for site {}", site_id);

        Ok(RegistrationGuard {
            registry: self.clone(),
            site_id,
        })
    }

    pub fn get(&self, site_id: i64) -> Option<Arc<Crawler>> {
        self.lock().get(&site_id).cloned()
    }

    pub fn contains(&self, site_id: i64) -> bool {
        self.lock().contains_key(&site_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, site_id: i64) {
        if self.lock().remove(&site_id).is_some() {
            debug!("Deregistered crawler for site {}", site_id);
        }
    }
}

/// Keeps a site registered for as long as it lives
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: CrawlerRegistry,
    site_id: i64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.site_id);
    }
}
