//! Crawler module for web page fetching and processing
//!
//! This module contains the crawl engine and its parts:
//! - The URL frontier (FIFO queue with dedup, in-flight tracking and a cap)
//! - HTTP fetching with scoped basic auth and manual redirects
//! - HTML parsing of SEO metadata and links
//! - The worker pool and the engine that streams page reports

mod engine;
mod fetcher;
mod frontier;
mod options;
mod parser;
mod report;
mod worker;

pub use engine::{Crawler, EngineState};
pub use fetcher::{build_http_client, classify_error, FetchClient};
pub use frontier::{Frontier, FrontierEntry};
pub use options::{
    BasicAuth, CrawlOptions, DEFAULT_MAX_PAGE_REPORTS, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT,
    DEFAULT_WORKERS,
};
pub use parser::{parse_html, robots_flags, ParsedLink, ParsedPage};
pub use report::{CrawlResponse, ExternalLink, Hreflang, Image, InternalLink, PageReport};
