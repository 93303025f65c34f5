//! HTML parser for extracting links and SEO metadata
//!
//! This module handles parsing HTML content to extract:
//! - Title, meta description, meta robots, canonical and language
//! - The first h1/h2 and whether the heading outline is well formed
//! - The visible word count
//! - Links (with their rel attribute and anchor text), hreflang alternates
//! - Images, scripts, stylesheets, iframes, audio and video sources

use crate::crawler::report::{Hreflang, Image};
use crate::url::normalize_relative;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A link found in an `<a href>` tag, resolved to an absolute URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    pub url: Url,
    pub rel: String,
    pub text: String,
}

impl ParsedLink {
    /// Returns true if the rel attribute carries `token`
    pub fn has_rel(&self, token: &str) -> bool {
        has_token(&self.rel, token)
    }
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub description: String,
    pub canonical: String,
    pub lang: String,
    pub h1: String,
    pub h2: String,
    pub valid_headings: bool,
    pub words: usize,

    /// Content of `<meta name="robots">`
    pub robots: String,
    pub noindex: bool,
    pub nofollow: bool,

    pub links: Vec<ParsedLink>,
    pub hreflangs: Vec<Hreflang>,
    pub images: Vec<Image>,
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    pub iframes: Vec<String>,
    pub audios: Vec<String>,
    pub videos: Vec<String>,
}

/// Parses HTML content and extracts links and SEO metadata
///
/// Relative references are resolved against `<base href>` when present,
/// otherwise against `page_url`.
///
/// # Link Extraction Rules
///
/// **Excluded:** `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only
/// hrefs, plus anything that does not resolve to an http(s) URL.
///
/// # Example
///
/// ```
/// use sumi_audit::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, "Test");
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);

    let robots = meta_content(&document, "robots");
    let (noindex, nofollow) = robots_flags(&robots);

    let (canonical, hreflangs, styles) = extract_link_tags(&document, &base);

    ParsedPage {
        title: extract_title(&document),
        description: meta_content(&document, "description"),
        canonical,
        lang: first_attr(&document, "html[lang]", "lang"),
        h1: first_text(&document, "h1"),
        h2: first_text(&document, "h2"),
        valid_headings: has_valid_heading_order(&document),
        words: count_words(&document),
        robots,
        noindex,
        nofollow,
        links: extract_links(&document, &base),
        hreflangs,
        images: extract_images(&document, &base),
        scripts: collect_sources(&document, &base, "script[src]", "src"),
        styles,
        iframes: collect_sources(&document, &base, "iframe[src]", "src"),
        audios: collect_media(&document, &base, "audio"),
        videos: collect_media(&document, &base, "video"),
    }
}

/// Returns (noindex, nofollow) for a robots directive string
///
/// Accepts both meta robots content and X-Robots-Tag values, including
/// agent-prefixed forms such as `googlebot: noindex`.
pub fn robots_flags(directives: &str) -> (bool, bool) {
    let mut noindex = false;
    let mut nofollow = false;
    for token in directives
        .split(|c: char| c == ',' || c == ':' || c.is_whitespace())
        .map(|t| t.trim().to_ascii_lowercase())
    {
        match token.as_str() {
            "noindex" => noindex = true,
            "nofollow" => nofollow = true,
            "none" => {
                noindex = true;
                nofollow = true;
            }
            _ => {}
        }
    }
    (noindex, nofollow)
}

/// Returns true if a whitespace separated attribute value carries `token`
fn has_token(value: &str, token: &str) -> bool {
    value
        .split_ascii_whitespace()
        .any(|t| t.eq_ignore_ascii_case(token))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    let href = first_attr(document, "base[href]", "href");
    if href.is_empty() {
        return page_url.clone();
    }
    page_url.join(&href).unwrap_or_else(|_| page_url.clone())
}

/// Resolves an href to an absolute, normalized URL
///
/// Returns None for the excluded schemes and for anything unresolvable.
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    normalize_relative(base, href).ok()
}

fn extract_title(document: &Html) -> String {
    first_text(document, "title")
}

fn first_text(document: &Html, css: &str) -> String {
    selector(css)
        .and_then(|sel| document.select(&sel).next().map(|e| element_text(&e)))
        .unwrap_or_default()
}

fn first_attr(document: &Html, css: &str, attr: &str) -> String {
    selector(css)
        .and_then(|sel| {
            document
                .select(&sel)
                .find_map(|e| e.value().attr(attr))
                .map(|v| v.trim().to_string())
        })
        .unwrap_or_default()
}

/// Content of the first `<meta name="...">` whose name matches (case-insensitive)
fn meta_content(document: &Html, name: &str) -> String {
    let Some(sel) = selector("meta[name][content]") else {
        return String::new();
    };

    document
        .select(&sel)
        .find(|e| {
            e.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|e| e.value().attr("content"))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

fn extract_links(document: &Html, base: &Url) -> Vec<ParsedLink> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let url = resolve_link(href, base)?;
            Some(ParsedLink {
                url,
                rel: element.value().attr("rel").unwrap_or("").trim().to_string(),
                text: element_text(&element),
            })
        })
        .collect()
}

/// Walks `<link rel href>` tags once, returning canonical, hreflangs and stylesheets
fn extract_link_tags(document: &Html, base: &Url) -> (String, Vec<Hreflang>, Vec<String>) {
    let mut canonical = String::new();
    let mut hreflangs = Vec::new();
    let mut styles = Vec::new();

    let Some(sel) = selector("link[rel][href]") else {
        return (canonical, hreflangs, styles);
    };

    for element in document.select(&sel) {
        let rel = element.value().attr("rel").unwrap_or("");
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base))
        else {
            continue;
        };

        if has_token(rel, "canonical") && canonical.is_empty() {
            canonical = url.to_string();
        } else if has_token(rel, "alternate") {
            if let Some(lang) = element.value().attr("hreflang") {
                hreflangs.push(Hreflang {
                    url: url.to_string(),
                    lang: lang.trim().to_string(),
                });
            }
        } else if has_token(rel, "stylesheet") {
            styles.push(url.to_string());
        }
    }

    (canonical, hreflangs, styles)
}

fn extract_images(document: &Html, base: &Url) -> Vec<Image> {
    let Some(sel) = selector("img[src]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|element| {
            let url = resolve_link(element.value().attr("src")?, base)?;
            Some(Image {
                url: url.to_string(),
                alt: element.value().attr("alt").map(|a| a.trim().to_string()),
            })
        })
        .collect()
}

fn collect_sources(document: &Html, base: &Url, css: &str, attr: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|e| resolve_link(e.value().attr(attr)?, base))
        .map(|u| u.to_string())
        .collect()
}

/// Sources of `<audio>`/`<video>` elements, from `src` or nested `<source src>`
fn collect_media(document: &Html, base: &Url, tag: &str) -> Vec<String> {
    let mut sources = collect_sources(document, base, &format!("{tag}[src]"), "src");
    sources.extend(collect_sources(
        document,
        base,
        &format!("{tag} source[src]"),
        "src",
    ));
    sources
}

/// Headings must start at h1 and never skip a level on the way down
fn has_valid_heading_order(document: &Html) -> bool {
    let Some(sel) = selector("h1, h2, h3, h4, h5, h6") else {
        return true;
    };

    let mut previous = 0u8;
    for element in document.select(&sel) {
        let level = element.value().name().as_bytes()[1] - b'0';
        if level > previous + 1 {
            return false;
        }
        previous = level;
    }
    true
}

/// Counts words of visible body text
fn count_words(document: &Html) -> usize {
    let Some(body) = selector("body").and_then(|sel| document.select(&sel).next()) else {
        return 0;
    };

    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            (!hidden).then(|| text.split_whitespace().count())
        })
        .sum()
}
