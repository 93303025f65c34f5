use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_audit::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the domain a crawl with subdomains enabled is anchored to
///
/// This is the seed host with a leading `www.` removed, so a crawl seeded at
/// `www.example.com` also covers `example.com` and `blog.example.com`.
pub fn base_domain(host: &str) -> String {
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    }
}

/// Returns `scheme://host[:port]` for a URL, the key robots.txt is scoped to
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
