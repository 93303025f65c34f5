//! Crawl progress events and the in-process broker that fans them out

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Buffered events per topic before slow subscribers start lagging
const TOPIC_CAPACITY: usize = 256;

/// An event published while a site is being crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// One page report was processed
    PageReport {
        url: String,
        status_code: u16,
        crawled: bool,
        blocked_by_robots: bool,
        /// Reports processed so far in this run
        total_urls: u64,
    },

    /// The crawl finished; cross-page issue detection is starting
    IssuesInit { crawl_id: i64 },

    /// The run is complete
    CrawlEnd {
        crawl_id: i64,
        total_urls: u64,
        issues_total: u64,
    },
}

impl Message {
    /// Event name as seen by subscribers
    pub fn name(&self) -> &'static str {
        match self {
            Self::PageReport { .. } => "PageReport",
            Self::IssuesInit { .. } => "IssuesInit",
            Self::CrawlEnd { .. } => "CrawlEnd",
        }
    }
}

/// Per-site progress topic
pub fn crawl_topic(site_id: i64) -> String {
    format!("crawl:{}", site_id)
}

/// Pub/sub interface the crawl orchestrator depends on
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, message: Message);
}

/// In-process broker with one broadcast channel per topic
#[derive(Debug, Default)]
pub struct Broker {
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic, creating it if needed
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Message> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }
}

impl Publisher for Broker {
    fn publish(&self, topic: &str, message: Message) {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = topics.get(topic) {
            // No subscribers is not an error
            let _ = tx.send(message);
        }
    }
}
