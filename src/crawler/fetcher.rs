//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler:
//! - Building the HTTP client with the configured user agent and timeout
//! - Attaching basic auth only to hosts the credentials were issued for
//! - Leaving redirects to the caller so every hop is reported
//! - Error classification for uncrawled pages

use crate::crawler::options::{BasicAuth, CrawlOptions};
use reqwest::{redirect::Policy, Client, Request, RequestBuilder, Response};
use url::Url;

/// Builds an HTTP client with the run's user agent and timeout
///
/// Redirects are never followed automatically: a 3xx response is returned
/// as-is so the worker can record it and enqueue the target.
pub fn build_http_client(options: &CrawlOptions) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(options.user_agent.clone())
        .timeout(options.request_timeout)
        .connect_timeout(options.request_timeout)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP client shared by every worker of a crawl
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    auth: Option<BasicAuth>,
}

impl FetchClient {
    /// Creates a fetch client for one run
    pub fn new(options: &CrawlOptions) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(options)?,
            auth: options.basic_auth.clone(),
        })
    }

    /// Sends a GET request
    pub async fn get(&self, url: &Url) -> Result<Response, reqwest::Error> {
        let request = self.client.get(url.clone()).build()?;
        self.execute(request).await
    }

    /// Sends a HEAD request
    pub async fn head(&self, url: &Url) -> Result<Response, reqwest::Error> {
        let request = self.client.head(url.clone()).build()?;
        self.execute(request).await
    }

    /// Sends a prepared request, adding basic auth when the host is covered
    pub async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        let auth = self
            .auth
            .as_ref()
            .filter(|auth| request.url().host_str().is_some_and(|h| auth.applies_to(h)));

        let mut builder = RequestBuilder::from_parts(self.client.clone(), request);
        if let Some(auth) = auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        builder.send().await
    }
}

/// Turns a request error into the message stored on an uncrawled report
pub fn classify_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_body() || error.is_decode() {
        format!("Failed to read response body: {}", error)
    } else {
        error.to_string()
    }
}
