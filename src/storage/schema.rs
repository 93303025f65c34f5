//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Audit database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Audited sites
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Crawl runs and their aggregate counters
CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES sites(id),
    started_at TEXT NOT NULL,
    finished_at TEXT,
    total_urls INTEGER NOT NULL DEFAULT 0,
    blocked_by_robots INTEGER NOT NULL DEFAULT 0,
    noindex INTEGER NOT NULL DEFAULT 0,
    internal_follow_links INTEGER NOT NULL DEFAULT 0,
    internal_nofollow_links INTEGER NOT NULL DEFAULT 0,
    external_follow_links INTEGER NOT NULL DEFAULT 0,
    external_nofollow_links INTEGER NOT NULL DEFAULT 0,
    sponsored_links INTEGER NOT NULL DEFAULT 0,
    ugc_links INTEGER NOT NULL DEFAULT 0,
    robotstxt_exists INTEGER NOT NULL DEFAULT 0,
    sitemap_exists INTEGER NOT NULL DEFAULT 0,
    sitemap_is_blocked INTEGER NOT NULL DEFAULT 0,
    issues_total INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_crawls_site ON crawls(site_id);

-- One row per URL crawled in a run
CREATE TABLE IF NOT EXISTS page_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    depth INTEGER NOT NULL,
    status_code INTEGER NOT NULL,
    media_type TEXT NOT NULL,
    content_length INTEGER,
    body_size INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    canonical TEXT NOT NULL,
    h1 TEXT NOT NULL,
    h2 TEXT NOT NULL,
    lang TEXT NOT NULL,
    words INTEGER NOT NULL,
    valid_headings INTEGER NOT NULL,
    robots TEXT NOT NULL,
    noindex INTEGER NOT NULL,
    nofollow INTEGER NOT NULL,
    redirect_url TEXT NOT NULL,
    redirect_hash TEXT,
    blocked_by_robots INTEGER NOT NULL,
    crawled INTEGER NOT NULL,
    in_sitemap INTEGER NOT NULL,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_page_reports_crawl ON page_reports(crawl_id);
CREATE INDEX IF NOT EXISTS idx_page_reports_hash ON page_reports(crawl_id, url_hash);

-- Links found on a page
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_report_id INTEGER NOT NULL REFERENCES page_reports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    rel TEXT NOT NULL,
    text TEXT NOT NULL,
    external INTEGER NOT NULL,
    nofollow INTEGER NOT NULL,
    sponsored INTEGER NOT NULL DEFAULT 0,
    ugc INTEGER NOT NULL DEFAULT 0,
    status_code INTEGER
);

CREATE INDEX IF NOT EXISTS idx_links_crawl ON links(crawl_id);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_report_id INTEGER NOT NULL REFERENCES page_reports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    alt TEXT
);

CREATE INDEX IF NOT EXISTS idx_images_crawl ON images(crawl_id);

CREATE TABLE IF NOT EXISTS hreflangs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_report_id INTEGER NOT NULL REFERENCES page_reports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    lang TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hreflangs_crawl ON hreflangs(crawl_id);

-- Scripts, stylesheets, iframes, audio and video sources
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_report_id INTEGER NOT NULL REFERENCES page_reports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    kind TEXT NOT NULL,
    url TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_crawl ON resources(crawl_id);

-- Issues detected per page
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url_hash TEXT NOT NULL,
    issue_type TEXT NOT NULL,
    UNIQUE(crawl_id, url_hash, issue_type)
);

CREATE INDEX IF NOT EXISTS idx_issues_crawl ON issues(crawl_id);

-- Issue-count snapshot taken when a run ends
CREATE TABLE IF NOT EXISTS issue_counts (
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    issue_type TEXT NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (crawl_id, issue_type)
);
"#;

/// Tables holding page-level data of a run, children first
pub const CRAWL_DATA_TABLES: &[&str] = &[
    "links",
    "images",
    "hreflangs",
    "resources",
    "issues",
    "issue_counts",
    "page_reports",
];

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
