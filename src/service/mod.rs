//! Crawl orchestration
//!
//! [`CrawlerService`] is the entry point for running audits. It guarantees at
//! most one crawl per site, consumes the engine's result stream, keeps the
//! run's aggregate counters, and hands every report to persistence, issue
//! detection and the event broker. Once the stream closes the run is
//! finalized and the data of a superseded run is cleaned up in the background.

mod events;
mod registry;

pub use events::{crawl_topic, Broker, Message, Publisher};
pub use registry::{CrawlerRegistry, RegistrationGuard};

use crate::crawler::{CrawlResponse, Crawler};
use crate::issues::{CacheManager, ReportManager};
use crate::storage::{CrawlRun, Site, Store};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs crawls and wires their results into the collaborators
#[derive(Clone)]
pub struct CrawlerService {
    store: Arc<dyn Store>,
    reports: Arc<dyn ReportManager>,
    cache: Arc<dyn CacheManager>,
    publisher: Arc<dyn Publisher>,
    registry: CrawlerRegistry,
}

impl CrawlerService {
    pub fn new(
        store: Arc<dyn Store>,
        reports: Arc<dyn ReportManager>,
        cache: Arc<dyn CacheManager>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            store,
            reports,
            cache,
            publisher,
            registry: CrawlerRegistry::new(),
        }
    }

    /// Crawls `site` to completion and returns the finalized run
    ///
    /// Fails without registering anything if the site URL is malformed, and
    /// with [`crate::AuditError::AlreadyCrawling`] if the site is already
    /// being crawled.
    pub async fn start_crawler(&self, site: &Site) -> Result<CrawlRun> {
        self.start_crawler_with_cancel(site, CancellationToken::new())
            .await
    }

    /// Like [`CrawlerService::start_crawler`], with a token that aborts
    /// in-flight requests when cancelled
    pub async fn start_crawler_with_cancel(
        &self,
        site: &Site,
        cancel: CancellationToken,
    ) -> Result<CrawlRun> {
        let crawler = Arc::new(Crawler::new(&site.url, site.options.clone())?);
        let guard = self.registry.register(site.id, crawler.clone())?;

        let mut run = self.store.save_crawl(site).await?;
        info!(
            "Crawl {} of site {} started at {}",
            run.id,
            site.id,
            crawler.seed()
        );

        let mut stream = crawler.stream(cancel)?;
        let topic = crawl_topic(site.id);

        while let Some(response) = stream.recv().await {
            self.handle_response(&mut run, site, &topic, response).await;
        }

        run.robotstxt_exists = crawler.robotstxt_exists();
        run.sitemap_exists = crawler.sitemap_exists();
        run.sitemap_is_blocked = crawler.sitemap_is_blocked();
        run.end = Some(Utc::now());

        if let Err(e) = self.store.save_end_crawl(&run).await {
            error!("Failed to finalize crawl {}: {}", run.id, e);
        }

        self.publisher
            .publish(&topic, Message::IssuesInit { crawl_id: run.id });

        match self.reports.create_multipage_issues(&run).await {
            Ok(count) => {
                run.issues_total = count.total();
                if let Err(e) = self.store.save_issue_count(run.id, &count).await {
                    error!("Failed to save issue count of crawl {}: {}", run.id, e);
                }
            }
            Err(e) => error!("Issue detection failed for crawl {}: {}", run.id, e),
        }

        self.publisher.publish(
            &topic,
            Message::CrawlEnd {
                crawl_id: run.id,
                total_urls: run.total_urls,
                issues_total: run.issues_total,
            },
        );

        info!(
            "Crawl {} of site {} finished: {} URLs, {} issues",
            run.id, site.id, run.total_urls, run.issues_total
        );

        // Must be looked up while the site is still registered
        let previous = match self.store.get_previous_crawl(site.id).await {
            Ok(previous) => previous,
            Err(e) => {
                error!("Failed to look up previous crawl of site {}: {}", site.id, e);
                None
            }
        };

        drop(guard);
        if let Some(previous) = previous {
            self.schedule_cleanup(previous);
        }

        Ok(run)
    }

    /// Processes one streamed result
    async fn handle_response(
        &self,
        run: &mut CrawlRun,
        site: &Site,
        topic: &str,
        response: CrawlResponse,
    ) {
        let report = &response.report;
        run.record(report);

        if report.noindex && !site.options.include_noindex {
            debug!("Skipping noindex page {}", report.url);
        } else {
            if let Err(e) = self.store.save_page_report(report, run.id).await {
                error!("Failed to save report of {}: {}", report.url, e);
            }

            if report.crawled {
                if let Err(e) = self
                    .reports
                    .create_page_issues(report, &response.body, &response.headers, run)
                    .await
                {
                    error!("Issue detection failed for {}: {}", report.url, e);
                }
            }
        }

        self.publisher.publish(
            topic,
            Message::PageReport {
                url: report.url.clone(),
                status_code: report.status_code,
                crawled: report.crawled,
                blocked_by_robots: report.blocked_by_robots,
                total_urls: run.total_urls,
            },
        );
    }

    /// Deletes the page-level data of a superseded run in the background
    fn schedule_cleanup(&self, previous: CrawlRun) {
        let store = self.store.clone();
        let cache = self.cache.clone();

        tokio::spawn(async move {
            if let Err(e) = store.delete_crawl_data(&previous).await {
                error!("Failed to delete data of crawl {}: {}", previous.id, e);
                return;
            }
            cache.remove_crawl_cache(&previous).await;
            debug!("Cleaned up crawl {} of site {}", previous.id, previous.site_id);
        });
    }

    /// Stops the running crawl of a site
    ///
    /// Returns false if the site is not being crawled.
    pub fn stop_crawler(&self, site_id: i64) -> bool {
        match self.registry.get(site_id) {
            Some(crawler) => {
                crawler.stop();
                true
            }
            None => {
                warn!("No crawl running for site {}", site_id);
                false
            }
        }
    }

    /// The `n` most recent runs of a site, newest first, padded with
    /// placeholders up to `n`
    pub async fn get_last_crawls(&self, site_id: i64, n: usize) -> Result<Vec<CrawlRun>> {
        let mut runs = self.store.get_last_crawls(site_id, n).await?;
        runs.truncate(n);
        runs.resize_with(n, || CrawlRun::placeholder(site_id));
        Ok(runs)
    }

    pub fn is_crawling(&self, site_id: i64) -> bool {
        self.registry.contains(site_id)
    }
}
