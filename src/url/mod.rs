//! URL handling module for Sumi-Audit
//!
//! This module provides URL normalization, hashing, domain extraction, wildcard
//! matching, and the internal/external scope decision for a crawl.

mod domain;
mod matcher;
mod normalize;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::{base_domain, extract_domain, origin_of};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_relative, normalize_url, url_hash};

/// Decides whether a URL belongs to the site being crawled
///
/// Without subdomains a URL is internal only when its host equals the seed
/// host. With subdomains enabled the seed host minus `www.` becomes the base
/// domain, and the base domain plus every subdomain of it is internal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    host: String,
    base: String,
    allow_subdomains: bool,
}

impl CrawlScope {
    /// Builds the scope from an already-normalized seed URL
    pub fn new(seed: &Url, allow_subdomains: bool) -> Result<Self, UrlError> {
        let host = extract_domain(seed).ok_or(UrlError::MissingDomain)?;
        let base = base_domain(&host);
        Ok(Self {
            host,
            base,
            allow_subdomains,
        })
    }

    /// The seed host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns true if `url` should be treated as an internal link
    pub fn is_internal(&self, url: &Url) -> bool {
        match extract_domain(url) {
            Some(host) => self.is_internal_host(&host),
            None => false,
        }
    }

    /// Returns true if a lowercase host is inside the scope
    pub fn is_internal_host(&self, host: &str) -> bool {
        if self.allow_subdomains {
            matches_wildcard(&format!("*.{}", self.base), host)
        } else {
            host == self.host
        }
    }
}
