//! Page reports produced by the crawl workers

use crate::url::url_hash;
use reqwest::header::HeaderMap;

/// A link to a page inside the crawl scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalLink {
    pub url: String,
    pub rel: String,
    pub nofollow: bool,
    pub text: String,
}

/// A link leaving the crawl scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLink {
    pub url: String,
    pub rel: String,
    pub nofollow: bool,
    pub sponsored: bool,
    pub ugc: bool,
    pub text: String,

    /// Status of the HEAD check, when external links are checked
    pub status_code: Option<u16>,
}

/// An alternate language version of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hreflang {
    pub url: String,
    pub lang: String,
}

/// An image referenced by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub alt: Option<String>,
}

/// Everything the crawler learned about one URL
///
/// Exactly one report is emitted per URL the frontier hands out, whether or
/// not the URL could be fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageReport {
    pub url: String,
    pub url_hash: String,
    pub depth: u32,

    pub status_code: u16,
    pub media_type: String,
    pub content_length: Option<u64>,
    pub body_size: usize,

    pub title: String,
    pub description: String,
    pub canonical: String,
    pub h1: String,
    pub h2: String,
    pub lang: String,
    pub words: usize,
    pub valid_headings: bool,

    /// Combined meta robots and X-Robots-Tag directives
    pub robots: String,
    pub noindex: bool,
    pub nofollow: bool,

    pub redirect_url: String,
    pub blocked_by_robots: bool,
    pub crawled: bool,
    pub in_sitemap: bool,
    pub error: Option<String>,

    pub internal_links: Vec<InternalLink>,
    pub external_links: Vec<ExternalLink>,
    pub hreflangs: Vec<Hreflang>,
    pub images: Vec<Image>,
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    pub iframes: Vec<String>,
    pub audios: Vec<String>,
    pub videos: Vec<String>,
}

impl PageReport {
    /// Creates an empty report for a normalized URL
    pub fn new(url: &str, depth: u32) -> Self {
        Self {
            url: url.to_string(),
            url_hash: url_hash(url),
            depth,
            valid_headings: true,
            ..Self::default()
        }
    }

    /// A report for a URL robots.txt does not allow us to fetch
    pub fn blocked(url: &str, depth: u32) -> Self {
        Self {
            blocked_by_robots: true,
            ..Self::new(url, depth)
        }
    }

    /// A report for a URL that could not be fetched
    pub fn failed(url: &str, depth: u32, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(url, depth)
        }
    }

    /// Returns true if the response was a redirect
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Returns true if the page was fetched and served HTML
    pub fn is_html(&self) -> bool {
        self.media_type == "text/html" || self.media_type == "application/xhtml+xml"
    }
}

/// One item of a crawl's result stream
#[derive(Debug, Clone)]
pub struct CrawlResponse {
    pub report: PageReport,

    /// Response headers; empty when nothing was fetched
    pub headers: HeaderMap,

    /// Raw response body; empty when nothing was fetched
    pub body: String,
}

impl CrawlResponse {
    pub fn new(report: PageReport) -> Self {
        Self {
            report,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }
}
