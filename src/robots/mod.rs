//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files for the origins a crawl touches.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use crate::crawler::FetchClient;
use tracing::{debug, warn};
use url::Url;

/// Fetches robots.txt for an origin (`scheme://host[:port]`)
///
/// Only a 2xx response counts as an existing robots.txt. Any other status,
/// or a network error, is treated as "no robots.txt" and allows everything.
pub async fn fetch_robots(client: &FetchClient, origin: &str) -> ParsedRobots {
    let url = match Url::parse(origin).and_then(|o| o.join("/robots.txt")) {
        Ok(url) => url,
        Err(e) => {
            warn!("Invalid origin {}: {}", origin, e);
            return ParsedRobots::allow_all();
        }
    };

    let response = match client.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            debug!("Failed to fetch {}: {}", url, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        debug!("No robots.txt at {} (HTTP {})", url, response.status());
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            debug!("Fetched robots.txt for {} ({} bytes)", origin, body.len());
            ParsedRobots::from_content(&body)
        }
        Err(e) => {
            warn!("Failed to read robots.txt body from {}: {}", url, e);
            ParsedRobots::allow_all()
        }
    }
}
