//! Per-run crawl options
//!
//! Options are fixed when a run starts. The engine, workers and orchestrator
//! only ever read them.

use crate::url::matches_any;
use std::time::Duration;

/// Default cap on the number of page reports a run produces
pub const DEFAULT_MAX_PAGE_REPORTS: usize = 20_000;

/// Default number of concurrent crawl workers
pub const DEFAULT_WORKERS: usize = 8;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent, used when no configuration provides one
pub const DEFAULT_USER_AGENT: &str = "SumiAudit/1.0 (+https://github.com/sumi-audit)";

/// HTTP basic auth credentials, sent only to the listed domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,

    /// Domain patterns (`example.com` or `*.example.com`)
    pub domains: Vec<String>,
}

impl BasicAuth {
    /// Returns true if credentials may be sent to `host`
    pub fn applies_to(&self, host: &str) -> bool {
        matches_any(&self.domains, &host.to_lowercase())
    }
}

/// Options controlling a single crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_page_reports: usize,
    pub ignore_robots_txt: bool,
    pub follow_nofollow: bool,
    pub include_noindex: bool,
    pub crawl_sitemap: bool,
    pub allow_subdomains: bool,
    pub check_external_links: bool,
    pub basic_auth: Option<BasicAuth>,
    pub user_agent: String,
    pub workers: usize,
    pub request_timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_page_reports: DEFAULT_MAX_PAGE_REPORTS,
            ignore_robots_txt: false,
            follow_nofollow: false,
            include_noindex: false,
            crawl_sitemap: true,
            allow_subdomains: false,
            check_external_links: false,
            basic_auth: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CrawlOptions {
    /// The product token robots.txt groups are matched against
    ///
    /// `SumiAudit/1.0 (+https://...)` becomes `SumiAudit`.
    pub fn robots_agent(&self) -> &str {
        let end = self
            .user_agent
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(self.user_agent.len());
        if end == 0 {
            "*"
        } else {
            &self.user_agent[..end]
        }
    }
}
