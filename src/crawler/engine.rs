//! Crawl engine
//!
//! A [`Crawler`] owns the frontier and worker pool of one crawl run. Calling
//! [`Crawler::stream`] starts the run in the background and hands back the
//! receiving end of a bounded channel that yields one [`CrawlResponse`] per
//! crawled URL, in completion order. The channel closes once every worker has
//! exited.

use crate::crawler::fetcher::FetchClient;
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::options::CrawlOptions;
use crate::crawler::report::CrawlResponse;
use crate::crawler::worker::{run_worker, CrawlContext};
use crate::sitemap;
use crate::url::{normalize_url, CrawlScope};
use crate::{AuditError, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

/// Lifecycle of a [`Crawler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, stream not started
    Idle,
    /// Workers are running
    Running,
    /// `stop` was called; in-flight URLs are finishing
    Stopping,
    /// All workers exited and the stream is closed
    Drained,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Drained => "drained",
        };
        write!(f, "{}", name)
    }
}

/// Site facts discovered while the run starts up
#[derive(Debug, Default)]
struct CrawlFacts {
    robotstxt_exists: AtomicBool,
    sitemap_exists: AtomicBool,
    sitemap_is_blocked: AtomicBool,
}

/// The crawl engine for one run
#[derive(Debug)]
pub struct Crawler {
    seed: Url,
    ctx: Arc<CrawlContext>,
    facts: Arc<CrawlFacts>,
    state: Arc<Mutex<EngineState>>,
}

impl Crawler {
    /// Creates an engine for `seed`
    ///
    /// Fails if the seed is not a valid http(s) URL or the HTTP client cannot
    /// be built. Nothing is fetched until [`Crawler::stream`] is called.
    pub fn new(seed: &str, options: CrawlOptions) -> Result<Self> {
        let seed = normalize_url(seed)?;
        let scope = CrawlScope::new(&seed, options.allow_subdomains)?;
        let client = FetchClient::new(&options)?;

        Ok(Self {
            seed,
            ctx: Arc::new(CrawlContext::new(options, scope, client)),
            facts: Arc::new(CrawlFacts::default()),
            state: Arc::new(Mutex::new(EngineState::Idle)),
        })
    }

    /// The normalized seed URL
    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.ctx.options
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    /// Starts the crawl and returns its result stream
    ///
    /// The stream can be taken once; a second call fails with
    /// [`AuditError::AlreadyStarted`]. Cancelling `cancel` aborts in-flight
    /// requests: the affected URLs are emitted uncrawled and the stream closes.
    pub fn stream(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<CrawlResponse>> {
        {
            let mut state = lock(&self.state);
            if *state != EngineState::Idle {
                return Err(AuditError::AlreadyStarted);
            }
            *state = EngineState::Running;
        }

        let (tx, rx) = mpsc::channel(self.ctx.options.workers.max(1) * 2);
        tokio::spawn(drive(
            self.seed.clone(),
            self.ctx.clone(),
            self.facts.clone(),
            self.state.clone(),
            tx,
            cancel,
        ));
        Ok(rx)
    }

    /// Stops admitting new URLs
    ///
    /// In-flight fetches finish and are emitted, then the stream closes.
    /// Safe to call repeatedly and from any task.
    pub fn stop(&self) {
        self.ctx.frontier.close();
        let mut state = lock(&self.state);
        if *state == EngineState::Running {
            *state = EngineState::Stopping;
            info!("Stopping crawl of {}", self.seed);
        }
    }

    /// Whether the site serves a robots.txt; valid after the stream closes
    pub fn robotstxt_exists(&self) -> bool {
        self.facts.robotstxt_exists.load(Ordering::Acquire)
    }

    /// Whether a sitemap was found; valid after the stream closes
    pub fn sitemap_exists(&self) -> bool {
        self.facts.sitemap_exists.load(Ordering::Acquire)
    }

    /// Whether robots.txt disallows a sitemap; valid after the stream closes
    pub fn sitemap_is_blocked(&self) -> bool {
        self.facts.sitemap_is_blocked.load(Ordering::Acquire)
    }
}

fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seeds the frontier, runs the worker pool and closes the stream
async fn drive(
    seed: Url,
    ctx: Arc<CrawlContext>,
    facts: Arc<CrawlFacts>,
    state: Arc<Mutex<EngineState>>,
    tx: mpsc::Sender<CrawlResponse>,
    cancel: CancellationToken,
) {
    info!("Starting crawl of {} with {} workers", seed, ctx.options.workers);

    let seeded = tokio::select! {
        in_sitemap = seed_frontier(&seed, &ctx, &facts) => Some(in_sitemap),
        _ = cancel.cancelled() => None,
    };

    if let Some(in_sitemap) = seeded {
        let in_sitemap = Arc::new(in_sitemap);
        let mut workers = JoinSet::new();
        for id in 0..ctx.options.workers.max(1) {
            workers.spawn(run_worker(
                id,
                ctx.clone(),
                in_sitemap.clone(),
                tx.clone(),
                cancel.clone(),
            ));
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                // A lost worker leaves its URL in flight forever
                error!("Crawl worker failed: {}", e);
                ctx.frontier.close();
            }
        }
    } else {
        debug!("Crawl of {} cancelled before it started", seed);
    }

    ctx.frontier.close();
    *lock(&state) = EngineState::Drained;
    info!(
        "Crawl of {} drained ({} URLs admitted)",
        seed,
        ctx.frontier.admitted()
    );
    drop(tx);
}

/// Records robots/sitemap facts and pushes the seed and sitemap entries
///
/// Returns the set of URLs listed in the site's sitemaps.
async fn seed_frontier(seed: &Url, ctx: &CrawlContext, facts: &CrawlFacts) -> HashSet<String> {
    let robots = ctx.robots.get(seed).await;
    facts
        .robotstxt_exists
        .store(robots.exists(), Ordering::Release);

    ctx.frontier.push(FrontierEntry::new(seed.to_string(), 0));

    let discovery = sitemap::discover(
        &ctx.client,
        &robots,
        seed,
        ctx.options.robots_agent(),
        !ctx.options.ignore_robots_txt,
        ctx.options.max_page_reports,
    )
    .await;
    facts
        .sitemap_exists
        .store(discovery.exists, Ordering::Release);
    facts
        .sitemap_is_blocked
        .store(discovery.is_blocked, Ordering::Release);

    if ctx.options.crawl_sitemap {
        let mut pushed = 0usize;
        for url in &discovery.urls {
            let internal = Url::parse(url).is_ok_and(|u| ctx.scope.is_internal(&u));
            if internal && ctx.frontier.push(FrontierEntry::from_sitemap(url.clone())) {
                pushed += 1;
            }
        }
        debug!("Queued {} sitemap URLs", pushed);
    }

    discovery.urls.into_iter().collect()
}
