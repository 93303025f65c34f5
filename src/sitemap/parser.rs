//! XML sitemap parser
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents. Only the
//! `<loc>` values are extracted.

use crate::sitemap::SitemapError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// The two kinds of sitemap document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// A list of page URLs
    UrlSet,
    /// A list of child sitemaps
    Index,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    pub kind: SitemapKind,
    /// `<loc>` values in document order, trimmed
    pub locs: Vec<String>,
}

/// Parses a sitemap or sitemap index
///
/// Fails with [`SitemapError::NotASitemap`] when the root element is neither
/// `urlset` nor `sitemapindex`.
pub fn parse_sitemap(xml: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut kind = None;
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"urlset" if kind.is_none() => kind = Some(SitemapKind::UrlSet),
                    b"sitemapindex" if kind.is_none() => kind = Some(SitemapKind::Index),
                    b"loc" => in_loc = true,
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Event::Text(t) if in_loc => {
                let text = t.unescape()?;
                push_loc(&mut locs, &text);
            }
            Event::CData(c) if in_loc => {
                push_loc(&mut locs, &String::from_utf8_lossy(&c.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let kind = kind.ok_or(SitemapError::NotASitemap)?;
    Ok(SitemapDocument { kind, locs })
}

fn push_loc(locs: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        locs.push(text.to_string());
    }
}
