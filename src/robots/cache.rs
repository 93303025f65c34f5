//! Per-run robots.txt cache
//!
//! Every origin (scheme, host and port) has its own robots.txt. The cache
//! fetches each one at most once per run, even when several workers ask for
//! the same origin concurrently.

use crate::crawler::FetchClient;
use crate::robots::{fetch_robots, ParsedRobots};
use crate::url::origin_of;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use url::Url;

/// Robots.txt files fetched during one crawl, keyed by origin
#[derive(Debug)]
pub struct RobotsCache {
    client: FetchClient,
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<ParsedRobots>>>>>,
}

impl RobotsCache {
    pub fn new(client: FetchClient) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the robots.txt governing `url`, fetching it on first use
    pub async fn get(&self, url: &Url) -> Arc<ParsedRobots> {
        let origin = origin_of(url);
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(origin.clone()).or_default().clone()
        };

        cell.get_or_init(|| async { Arc::new(fetch_robots(&self.client, &origin).await) })
            .await
            .clone()
    }

    /// Checks `url` against its origin's robots.txt
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        self.get(url).await.is_allowed(url.as_str(), user_agent)
    }

    /// Number of origins fetched or being fetched
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
