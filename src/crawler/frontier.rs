//! URL frontier shared by the workers of one crawl
//!
//! The frontier is a FIFO queue of normalized URLs with duplicate
//! suppression, in-flight tracking, a cap on the number of URLs ever admitted
//! and a close flag. Every URL moves `Unseen -> Queued -> InFlight -> Done`
//! exactly once.

use crate::state::UrlState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// A URL waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized URL; the frontier's identity key
    pub url: String,
    pub depth: u32,
    pub from_sitemap: bool,
}

impl FrontierEntry {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            from_sitemap: false,
        }
    }

    pub fn from_sitemap(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 1,
            from_sitemap: true,
        }
    }
}

#[derive(Debug, Default)]
struct FrontierInner {
    queue: VecDeque<FrontierEntry>,
    states: HashMap<String, UrlState>,
    in_flight: usize,
    closed: bool,
}

/// Thread-safe crawl frontier
///
/// The lock is never held across an await point; waiting happens on a
/// [`Notify`] that `push`, `ack` and `close` signal.
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    notify: Notify,
    max_urls: usize,
}

impl Frontier {
    /// Creates a frontier admitting at most `max_urls` distinct URLs
    pub fn new(max_urls: usize) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            notify: Notify::new(),
            max_urls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits an entry if its URL is unseen, the frontier is open and the cap
    /// has not been reached
    ///
    /// Returns true if the entry was queued.
    pub fn push(&self, entry: FrontierEntry) -> bool {
        {
            let mut guard = self.lock();
            let inner = &mut *guard;

            if inner.closed
                || inner.states.len() >= self.max_urls
                || inner.states.contains_key(&entry.url)
            {
                return false;
            }

            inner.states.insert(entry.url.clone(), UrlState::Queued);
            inner.queue.push_back(entry);
        }
        self.notify.notify_waiters();
        true
    }

    /// Dequeues the oldest queued entry without waiting
    pub fn poll(&self) -> Option<FrontierEntry> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.closed {
            return None;
        }

        let entry = inner.queue.pop_front()?;
        inner.states.insert(entry.url.clone(), UrlState::InFlight);
        inner.in_flight += 1;
        Some(entry)
    }

    /// Waits for the next entry
    ///
    /// Returns None once nothing is queued or in flight, or once the frontier
    /// has been closed.
    pub async fn next(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent push is not missed
            notified.as_mut().enable();

            if let Some(entry) = self.poll() {
                return Some(entry);
            }
            if !self.is_active() || self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Marks an in-flight URL as done
    ///
    /// Unknown URLs and URLs that are not in flight are ignored.
    pub fn ack(&self, url: &str) {
        let drained = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            match inner.states.get_mut(url) {
                Some(state) if state.can_transition_to(UrlState::Done) => {
                    *state = UrlState::Done;
                    inner.in_flight -= 1;
                }
                _ => return,
            }
            inner.in_flight == 0 && inner.queue.is_empty()
        };

        // Only a drained frontier can release waiting workers
        if drained {
            self.notify.notify_waiters();
        }
    }

    /// True while at least one URL is queued or in flight
    pub fn is_active(&self) -> bool {
        let inner = self.lock();
        !inner.queue.is_empty() || inner.in_flight > 0
    }

    /// Stops handing out entries; in-flight URLs can still be acked
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Current state of a URL; URLs never pushed are `Unseen`
    pub fn state(&self, url: &str) -> UrlState {
        self.lock()
            .states
            .get(url)
            .copied()
            .unwrap_or(UrlState::Unseen)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct URLs ever admitted
    pub fn admitted(&self) -> usize {
        self.lock().states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_push_deduplicates() {
        let frontier = Frontier::new(100);
        assert!(frontier.push(FrontierEntry::new("https://example.com/", 0)));
        assert!(!frontier.push(FrontierEntry::new("https://example.com/", 1)));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_fifo_order() {
        let frontier = Frontier::new(100);
        for path in ["a", "b", "c"] {
            frontier.push(FrontierEntry::new(format!("https://example.com/{path}"), 1));
        }
        let order: Vec<String> = std::iter::from_fn(|| frontier.poll())
            .map(|e| e.url)
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c"
            ]
        );
    }

    #[test]
    fn test_state_transitions() {
        let frontier = Frontier::new(100);
        let url = "https://example.com/";
        assert_eq!(frontier.state(url), UrlState::Unseen);

        frontier.push(FrontierEntry::new(url, 0));
        assert_eq!(frontier.state(url), UrlState::Queued);

        frontier.poll();
        assert_eq!(frontier.state(url), UrlState::InFlight);
        assert!(frontier.is_active());

        frontier.ack(url);
        assert_eq!(frontier.state(url), UrlState::Done);
        assert!(!frontier.is_active());

        // Done never goes back to Queued
        assert!(!frontier.push(FrontierEntry::new(url, 3)));
        assert_eq!(frontier.state(url), UrlState::Done);
    }

    #[test]
    fn test_ack_unknown_or_queued_is_noop() {
        let frontier = Frontier::new(100);
        frontier.ack("https://example.com/never");
        frontier.push(FrontierEntry::new("https://example.com/", 0));
        frontier.ack("https://example.com/");
        assert_eq!(frontier.state("https://example.com/"), UrlState::Queued);
        assert!(frontier.is_active());
    }

    #[test]
    fn test_cap_counts_every_admitted_url() {
        let frontier = Frontier::new(3);
        for i in 0..10 {
            frontier.push(FrontierEntry::new(format!("https://example.com/{i}"), 1));
        }
        assert_eq!(frontier.admitted(), 3);

        while let Some(entry) = frontier.poll() {
            frontier.ack(&entry.url);
        }
        // Draining does not free capacity
        assert!(!frontier.push(FrontierEntry::new("https://example.com/late", 1)));
    }

    #[test]
    fn test_close_stops_polls_but_allows_ack() {
        let frontier = Frontier::new(100);
        frontier.push(FrontierEntry::new("https://example.com/a", 0));
        frontier.push(FrontierEntry::new("https://example.com/b", 0));
        let entry = frontier.poll().unwrap();

        frontier.close();
        frontier.close();
        assert!(frontier.is_closed());
        assert!(frontier.poll().is_none());
        assert!(!frontier.push(FrontierEntry::new("https://example.com/c", 0)));

        frontier.ack(&entry.url);
        assert_eq!(frontier.state(&entry.url), UrlState::Done);
    }

    #[tokio::test]
    async fn test_next_returns_none_when_empty() {
        let frontier = Frontier::new(10);
        assert!(frontier.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_waits_for_in_flight_discoveries() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.push(FrontierEntry::new("https://example.com/", 0));
        let first = frontier.next().await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        frontier.push(FrontierEntry::new("https://example.com/child", 1));
        frontier.ack(&first.url);

        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.unwrap().url, "https://example.com/child");
    }

    #[tokio::test]
    async fn test_next_released_by_last_ack() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.push(FrontierEntry::new("https://example.com/", 0));
        let first = frontier.next().await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.ack(&first.url);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_next_released_by_close() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.push(FrontierEntry::new("https://example.com/", 0));
        let _in_flight = frontier.next().await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }
}
