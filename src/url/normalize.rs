use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

/// Normalizes a URL into the identity used for deduplication and hashing
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Only `http` and `https` are accepted, and a host is required
/// 3. Host lowercasing, default port removal, dot segments and the empty
///    path (`/`) are handled by the `url` parser
/// 4. Remove fragment (everything after #)
/// 5. Remove empty query string (trailing ?)
///
/// Trailing slashes, the `www.` prefix, the scheme and query order are kept:
/// each of those variants is a separate resource for a search engine.
///
/// # Examples
///
/// ```
/// use sumi_audit::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/a/../b/?#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if matches!(url.query(), Some("")) {
        url.set_query(None);
    }

    Ok(url)
}

/// Resolves `href` against `base` and normalizes the result
pub fn normalize_relative(base: &Url, href: &str) -> Result<Url, UrlError> {
    let joined = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_url(joined.as_str())
}

/// Stable identifier of a normalized URL (lowercase hex SHA-256)
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}
