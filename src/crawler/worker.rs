//! Crawl workers
//!
//! A worker repeatedly takes the next URL from the frontier, checks it against
//! robots.txt, fetches and parses it, enqueues what it discovered, acks the URL
//! and emits exactly one [`CrawlResponse`] for it.

use crate::crawler::fetcher::{classify_error, FetchClient};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::options::CrawlOptions;
use crate::crawler::parser::{parse_html, robots_flags, ParsedPage};
use crate::crawler::report::{CrawlResponse, ExternalLink, InternalLink, PageReport};
use crate::robots::RobotsCache;
use crate::state::UrlState;
use crate::url::{normalize_relative, CrawlScope};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

/// State shared by every worker of one crawl
#[derive(Debug)]
pub(crate) struct CrawlContext {
    pub options: CrawlOptions,
    pub scope: CrawlScope,
    pub client: FetchClient,
    pub frontier: Frontier,
    pub robots: RobotsCache,
    /// HEAD results for external links, shared so each is checked once
    external_status: Mutex<HashMap<String, Option<u16>>>,
}

impl CrawlContext {
    pub fn new(options: CrawlOptions, scope: CrawlScope, client: FetchClient) -> Self {
        Self {
            frontier: Frontier::new(options.max_page_reports),
            robots: RobotsCache::new(client.clone()),
            external_status: Mutex::new(HashMap::new()),
            options,
            scope,
            client,
        }
    }

    fn enforce_robots(&self) -> bool {
        !self.options.ignore_robots_txt
    }

    async fn robots_allow(&self, url: &Url) -> bool {
        !self.enforce_robots() || self.robots.is_allowed(url, self.options.robots_agent()).await
    }

    async fn external_status(&self, url: &Url) -> Option<u16> {
        let cached = self
            .external_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .copied();
        if let Some(status) = cached {
            return status;
        }

        let status = match self.client.head(url).await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                debug!("HEAD check failed for {}: {}", url, e);
                None
            }
        };
        self.external_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), status);
        status
    }
}

/// Runs one worker until the frontier is exhausted, closed or cancelled
pub(crate) async fn run_worker(
    id: usize,
    ctx: Arc<CrawlContext>,
    in_sitemap: Arc<HashSet<String>>,
    tx: mpsc::Sender<CrawlResponse>,
    cancel: CancellationToken,
) {
    trace!("Worker {} started", id);

    loop {
        let entry = tokio::select! {
            _ = cancel.cancelled() => break,
            entry = ctx.frontier.next() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        let (mut response, discovered) = tokio::select! {
            result = process(&ctx, &entry) => result,
            _ = cancel.cancelled() => {
                let report = PageReport::failed(&entry.url, entry.depth, "Crawl cancelled");
                (CrawlResponse::new(report), Vec::new())
            }
        };
        response.report.in_sitemap = entry.from_sitemap || in_sitemap.contains(&entry.url);

        for link in discovered {
            ctx.frontier.push(link);
        }
        ctx.frontier.ack(&entry.url);

        if tx.send(response).await.is_err() {
            debug!("Worker {}: result receiver dropped, exiting", id);
            break;
        }
    }

    trace!("Worker {} finished", id);
}

/// Produces the report for one URL plus the entries it discovered
async fn process(ctx: &CrawlContext, entry: &FrontierEntry) -> (CrawlResponse, Vec<FrontierEntry>) {
    let url = match Url::parse(&entry.url) {
        Ok(url) => url,
        Err(e) => {
            let report = PageReport::failed(&entry.url, entry.depth, e.to_string());
            return (CrawlResponse::new(report), Vec::new());
        }
    };

    if !ctx.robots_allow(&url).await {
        debug!("Blocked by robots.txt: {}", url);
        return (
            CrawlResponse::new(PageReport::blocked(&entry.url, entry.depth)),
            Vec::new(),
        );
    }

    let response = match ctx.client.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            let message = classify_error(&e);
            debug!("Failed to fetch {}: {}", url, message);
            let report = PageReport::failed(&entry.url, entry.depth, message);
            return (CrawlResponse::new(report), Vec::new());
        }
    };

    let mut report = PageReport::new(&entry.url, entry.depth);
    let mut discovered = Vec::new();
    let status = response.status();
    let headers = response.headers().clone();

    report.status_code = status.as_u16();
    report.media_type = media_type(&headers);
    report.content_length = response.content_length();
    let header_robots = x_robots_tag(&headers);

    if status.is_redirection() {
        report.crawled = true;
        apply_robots(&mut report, "", &header_robots);
        if let Some(target) = redirect_target(&url, &headers) {
            report.redirect_url = target.to_string();
            if ctx.scope.is_internal(&target) {
                discovered.push(FrontierEntry::new(target.to_string(), entry.depth + 1));
            }
        }
        let response = CrawlResponse {
            report,
            headers,
            body: String::new(),
        };
        return (response, discovered);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            let message = classify_error(&e);
            warn!("Failed to read body of {}: {}", url, message);
            let report = PageReport::failed(&entry.url, entry.depth, message);
            return (CrawlResponse::new(report), Vec::new());
        }
    };

    report.crawled = true;
    report.body_size = body.len();

    if report.is_html() {
        let page = parse_html(&body, &url);
        apply_robots(&mut report, &page.robots, &header_robots);
        discovered = classify_links(ctx, &mut report, &page, entry.depth).await;
        fill_page_fields(&mut report, page);
    } else {
        apply_robots(&mut report, "", &header_robots);
    }

    (
        CrawlResponse {
            report,
            headers,
            body,
        },
        discovered,
    )
}

/// Records internal and external links, returning the internal ones to enqueue
async fn classify_links(
    ctx: &CrawlContext,
    report: &mut PageReport,
    page: &ParsedPage,
    depth: u32,
) -> Vec<FrontierEntry> {
    let mut discovered = Vec::new();
    let mut queued = HashSet::new();

    for link in &page.links {
        let nofollow = link.has_rel("nofollow");

        if !ctx.scope.is_internal(&link.url) {
            let status = if ctx.options.check_external_links {
                ctx.external_status(&link.url).await
            } else {
                None
            };
            report.external_links.push(ExternalLink {
                url: link.url.to_string(),
                rel: link.rel.clone(),
                nofollow,
                sponsored: link.has_rel("sponsored"),
                ugc: link.has_rel("ugc"),
                text: link.text.clone(),
                status_code: status,
            });
            continue;
        }

        report.internal_links.push(InternalLink {
            url: link.url.to_string(),
            rel: link.rel.clone(),
            nofollow,
            text: link.text.clone(),
        });

        if (nofollow || report.nofollow) && !ctx.options.follow_nofollow {
            continue;
        }

        let key = link.url.to_string();
        if ctx.frontier.state(&key) != UrlState::Unseen || !queued.insert(key.clone()) {
            continue;
        }
        if !ctx.robots_allow(&link.url).await {
            trace!("Not enqueuing robots-disallowed link {}", link.url);
            continue;
        }
        discovered.push(FrontierEntry::new(key, depth + 1));
    }

    discovered
}

fn fill_page_fields(report: &mut PageReport, page: ParsedPage) {
    report.title = page.title;
    report.description = page.description;
    report.canonical = page.canonical;
    report.lang = page.lang;
    report.h1 = page.h1;
    report.h2 = page.h2;
    report.valid_headings = page.valid_headings;
    report.words = page.words;
    report.hreflangs = page.hreflangs;
    report.images = page.images;
    report.scripts = page.scripts;
    report.styles = page.styles;
    report.iframes = page.iframes;
    report.audios = page.audios;
    report.videos = page.videos;
}

/// Merges meta robots and X-Robots-Tag into the report
fn apply_robots(report: &mut PageReport, meta: &str, header: &str) {
    report.robots = [meta, header]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    let (noindex, nofollow) = robots_flags(&report.robots);
    report.noindex = noindex;
    report.nofollow = nofollow;
}

/// Lowercase media type without parameters (`text/html; charset=utf-8` -> `text/html`)
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn x_robots_tag(headers: &HeaderMap) -> String {
    headers
        .get_all("x-robots-tag")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(", ")
}

fn redirect_target(url: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    normalize_relative(url, location).ok()
}
