use crate::crawler::{
    BasicAuth, CrawlOptions, DEFAULT_MAX_PAGE_REPORTS, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WORKERS,
};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Audit
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl Config {
    /// User agent sent with every request
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.user_agent.crawler_name,
            self.user_agent.crawler_version,
            self.user_agent.contact_url,
            self.user_agent.contact_email
        )
    }

    /// Per-run crawl options described by this configuration
    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            max_page_reports: self.crawler.max_page_reports,
            ignore_robots_txt: self.crawler.ignore_robots_txt,
            follow_nofollow: self.crawler.follow_nofollow,
            include_noindex: self.crawler.include_noindex,
            crawl_sitemap: self.crawler.crawl_sitemap,
            allow_subdomains: self.crawler.allow_subdomains,
            check_external_links: self.crawler.check_external_links,
            basic_auth: self.auth.as_ref().map(|auth| BasicAuth {
                username: auth.username.clone(),
                password: auth.password.clone(),
                domains: auth.domains.clone(),
            }),
            user_agent: self.user_agent_string(),
            workers: self.crawler.workers,
            request_timeout: Duration::from_millis(self.crawler.request_timeout),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of URLs admitted per run
    pub max_page_reports: usize,

    /// Number of concurrent workers
    pub workers: usize,

    /// Per-request timeout (milliseconds)
    pub request_timeout: u64,

    pub ignore_robots_txt: bool,
    pub follow_nofollow: bool,
    pub include_noindex: bool,
    pub crawl_sitemap: bool,
    pub allow_subdomains: bool,

    /// Send a HEAD request to every external link
    pub check_external_links: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_page_reports: DEFAULT_MAX_PAGE_REPORTS,
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            ignore_robots_txt: false,
            follow_nofollow: false,
            include_noindex: false,
            crawl_sitemap: true,
            allow_subdomains: false,
            check_external_links: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also used as the robots.txt product token
    pub crawler_name: String,

    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// HTTP basic auth for staging sites
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,

    /// Hosts the credentials are sent to ("example.com" or "*.example.com")
    pub domains: Vec<String>,
}
