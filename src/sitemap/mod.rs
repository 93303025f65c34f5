//! Sitemap discovery
//!
//! Sitemaps are located from robots.txt `Sitemap:` lines, falling back to
//! `/sitemap.xml` at the seed's origin. A sitemap index is followed one level
//! deep.

mod parser;

pub use parser::{parse_sitemap, SitemapDocument, SitemapKind};

use crate::crawler::FetchClient;
use crate::robots::ParsedRobots;
use crate::url::{normalize_url, origin_of};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Sitemap-specific errors
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Document is not a sitemap")]
    NotASitemap,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}

/// What sitemap discovery found for a site
#[derive(Debug, Clone, Default)]
pub struct SitemapDiscovery {
    /// At least one candidate sitemap was served and parsed
    pub exists: bool,

    /// At least one candidate sitemap is disallowed by robots.txt
    pub is_blocked: bool,

    /// Normalized page URLs, deduplicated, in discovery order
    pub urls: Vec<String>,
}

/// Sitemap locations to try for a seed
pub fn sitemap_candidates(seed: &Url, robots: &ParsedRobots) -> Vec<Url> {
    let declared: Vec<Url> = robots
        .sitemaps()
        .iter()
        .filter_map(|s| normalize_url(s).ok())
        .collect();

    if !declared.is_empty() {
        return declared;
    }

    Url::parse(&origin_of(seed))
        .and_then(|origin| origin.join("/sitemap.xml"))
        .map(|u| vec![u])
        .unwrap_or_default()
}

/// Fetches and parses one sitemap document
pub async fn fetch_sitemap(client: &FetchClient, url: &Url) -> Result<SitemapDocument, SitemapError> {
    let response = client.get(url).await?;
    if !response.status().is_success() {
        return Err(SitemapError::Status(response.status().as_u16()));
    }
    let body = response.bytes().await?;
    parse_sitemap(&body)
}

/// Discovers the site's sitemaps and collects their page URLs
///
/// When `enforce_robots` is set, sitemaps robots.txt disallows are reported as
/// blocked and not fetched. At most `limit` page URLs are collected.
pub async fn discover(
    client: &FetchClient,
    robots: &ParsedRobots,
    seed: &Url,
    user_agent: &str,
    enforce_robots: bool,
    limit: usize,
) -> SitemapDiscovery {
    let mut discovery = SitemapDiscovery::default();
    let mut seen = HashSet::new();

    for candidate in sitemap_candidates(seed, robots) {
        if !robots.is_allowed(candidate.as_str(), user_agent) {
            discovery.is_blocked = true;
            if enforce_robots {
                debug!("Sitemap {} is disallowed by robots.txt", candidate);
                continue;
            }
        }

        let document = match fetch_sitemap(client, &candidate).await {
            Ok(document) => document,
            Err(e) => {
                debug!("No sitemap at {}: {}", candidate, e);
                continue;
            }
        };
        discovery.exists = true;

        let pages = match document.kind {
            SitemapKind::UrlSet => document.locs,
            SitemapKind::Index => {
                let mut pages = Vec::new();
                for child in document.locs.iter().filter_map(|l| normalize_url(l).ok()) {
                    if enforce_robots && !robots.is_allowed(child.as_str(), user_agent) {
                        discovery.is_blocked = true;
                        continue;
                    }
                    match fetch_sitemap(client, &child).await {
                        // Indexes nested in an index are not followed
                        Ok(doc) if doc.kind == SitemapKind::UrlSet => pages.extend(doc.locs),
                        Ok(_) => debug!("Ignoring nested sitemap index {}", child),
                        Err(e) => debug!("Failed to load child sitemap {}: {}", child, e),
                    }
                }
                pages
            }
        };

        for page in pages {
            if discovery.urls.len() >= limit {
                break;
            }
            if let Ok(url) = normalize_url(&page) {
                if seen.insert(url.to_string()) {
                    discovery.urls.push(url.to_string());
                }
            }
        }
    }

    info!(
        "Sitemap discovery for {}: exists={}, blocked={}, {} URLs",
        seed,
        discovery.exists,
        discovery.is_blocked,
        discovery.urls.len()
    );
    discovery
}
