//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the [`Store`] trait,
//! plus the queries the issue reporter runs against the same database.

use crate::crawler::PageReport;
use crate::issues::{IssueCount, IssueType};
use crate::storage::schema::{initialize_schema, CRAWL_DATA_TABLES};
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{CrawlRun, Site};
use crate::url::url_hash;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const CRAWL_COLUMNS: &str = "id, site_id, started_at, finished_at, total_urls, blocked_by_robots,
    noindex, internal_follow_links, internal_nofollow_links, external_follow_links,
    external_nofollow_links, sponsored_links, ugc_links, robotstxt_exists, sitemap_exists,
    sitemap_is_blocked, issues_total";

/// Condition selecting successfully fetched HTML pages of a run
const HTML_PAGES: &str =
    "crawl_id = ?1 AND crawled = 1 AND status_code BETWEEN 200 AND 299 AND media_type = 'text/html'";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Sites =====

    /// Returns the id of the site with `url`, creating it if needed
    pub fn upsert_site(&self, url: &str) -> StorageResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO sites (url, created_at) VALUES (?1, ?2)",
            params![url, Utc::now().to_rfc3339()],
        )?;
        let id = conn.query_row("SELECT id FROM sites WHERE url = ?1", params![url], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    // ===== Crawls =====

    /// Loads a single run
    pub fn get_crawl(&self, crawl_id: i64) -> StorageResult<CrawlRun> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {CRAWL_COLUMNS} FROM crawls WHERE id = ?1"),
            params![crawl_id],
            crawl_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(crawl_id))
    }

    /// Number of page reports stored for a run
    pub fn count_page_reports(&self, crawl_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM page_reports WHERE crawl_id = ?1",
            params![crawl_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Issues =====

    /// Records the issues found on one page
    pub fn save_page_issues(
        &self,
        crawl_id: i64,
        url_hash: &str,
        issues: &[IssueType],
    ) -> StorageResult<()> {
        if issues.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO issues (crawl_id, url_hash, issue_type) VALUES (?1, ?2, ?3)",
            )?;
            for issue in issues {
                stmt.execute(params![crawl_id, url_hash, issue.to_db_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// URL hashes of HTML pages sharing a non-empty title with another page
    pub fn duplicated_titles(&self, crawl_id: i64) -> StorageResult<Vec<String>> {
        self.duplicated_column(crawl_id, "title")
    }

    /// URL hashes of HTML pages sharing a non-empty description with another page
    pub fn duplicated_descriptions(&self, crawl_id: i64) -> StorageResult<Vec<String>> {
        self.duplicated_column(crawl_id, "description")
    }

    fn duplicated_column(&self, crawl_id: i64, column: &str) -> StorageResult<Vec<String>> {
        let sql = format!(
            "SELECT url_hash FROM page_reports
             WHERE {HTML_PAGES} AND {column} != ''
               AND {column} IN (
                   SELECT {column} FROM page_reports
                   WHERE {HTML_PAGES} AND {column} != ''
                   GROUP BY {column} HAVING COUNT(*) > 1
               )
             ORDER BY id"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let hashes = stmt
            .query_map(params![crawl_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    /// Counts the stored issues of a run by type
    pub fn count_issues(&self, crawl_id: i64) -> StorageResult<IssueCount> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT issue_type, COUNT(*) FROM issues WHERE crawl_id = ?1 GROUP BY issue_type",
        )?;
        let rows = stmt
            .query_map(params![crawl_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut count = IssueCount::default();
        for (name, n) in rows {
            if let Some(issue) = IssueType::from_db_string(&name) {
                count.add(issue, n as u64);
            }
        }
        Ok(count)
    }

    /// Loads the issue-count snapshot of a run
    pub fn get_issue_count(&self, crawl_id: i64) -> StorageResult<IssueCount> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT issue_type, count FROM issue_counts WHERE crawl_id = ?1")?;
        let rows = stmt
            .query_map(params![crawl_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut count = IssueCount::default();
        for (name, n) in rows {
            if let Some(issue) = IssueType::from_db_string(&name) {
                count.add(issue, n as u64);
            }
        }
        Ok(count)
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn crawl_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRun> {
    let started_at: String = row.get(2)?;
    let finished_at: Option<String> = row.get(3)?;
    let counter = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)? as u64) };

    Ok(CrawlRun {
        id: row.get(0)?,
        site_id: row.get(1)?,
        start: Some(parse_timestamp(2, &started_at)?),
        end: finished_at
            .as_deref()
            .map(|s| parse_timestamp(3, s))
            .transpose()?,
        total_urls: counter(4)?,
        blocked_by_robots: counter(5)?,
        noindex: counter(6)?,
        internal_follow_links: counter(7)?,
        internal_nofollow_links: counter(8)?,
        external_follow_links: counter(9)?,
        external_nofollow_links: counter(10)?,
        sponsored_links: counter(11)?,
        ugc_links: counter(12)?,
        robotstxt_exists: row.get(13)?,
        sitemap_exists: row.get(14)?,
        sitemap_is_blocked: row.get(15)?,
        issues_total: counter(16)?,
    })
}

#[async_trait]
impl Store for SqliteStorage {
    async fn save_crawl(&self, site: &Site) -> StorageResult<CrawlRun> {
        let start = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO crawls (site_id, started_at) VALUES (?1, ?2)",
            params![site.id, start.to_rfc3339()],
        )?;

        Ok(CrawlRun {
            id: conn.last_insert_rowid(),
            site_id: site.id,
            start: Some(start),
            ..CrawlRun::default()
        })
    }

    async fn save_page_report(&self, report: &PageReport, crawl_id: i64) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let redirect_hash = (!report.redirect_url.is_empty()).then(|| url_hash(&report.redirect_url));
        tx.execute(
            "INSERT INTO page_reports (crawl_id, url, url_hash, depth, status_code, media_type,
                content_length, body_size, title, description, canonical, h1, h2, lang, words,
                valid_headings, robots, noindex, nofollow, redirect_url, redirect_hash,
                blocked_by_robots, crawled, in_sitemap, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            params![
                crawl_id,
                report.url,
                report.url_hash,
                report.depth,
                report.status_code,
                report.media_type,
                report.content_length.map(|n| n as i64),
                report.body_size as i64,
                report.title,
                report.description,
                report.canonical,
                report.h1,
                report.h2,
                report.lang,
                report.words as i64,
                report.valid_headings,
                report.robots,
                report.noindex,
                report.nofollow,
                report.redirect_url,
                redirect_hash,
                report.blocked_by_robots,
                report.crawled,
                report.in_sitemap,
                report.error,
            ],
        )?;
        let page_id = tx.last_insert_rowid();

        {
            let mut links = tx.prepare(
                "INSERT INTO links (page_report_id, crawl_id, url, url_hash, rel, text, external,
                    nofollow, sponsored, ugc, status_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for link in &report.internal_links {
                links.execute(params![
                    page_id,
                    crawl_id,
                    link.url,
                    url_hash(&link.url),
                    link.rel,
                    link.text,
                    false,
                    link.nofollow,
                    false,
                    false,
                    Option::<u16>::None,
                ])?;
            }
            for link in &report.external_links {
                links.execute(params![
                    page_id,
                    crawl_id,
                    link.url,
                    url_hash(&link.url),
                    link.rel,
                    link.text,
                    true,
                    link.nofollow,
                    link.sponsored,
                    link.ugc,
                    link.status_code,
                ])?;
            }

            let mut images = tx.prepare(
                "INSERT INTO images (page_report_id, crawl_id, url, alt) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for image in &report.images {
                images.execute(params![page_id, crawl_id, image.url, image.alt])?;
            }

            let mut hreflangs = tx.prepare(
                "INSERT INTO hreflangs (page_report_id, crawl_id, url, lang) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for hreflang in &report.hreflangs {
                hreflangs.execute(params![page_id, crawl_id, hreflang.url, hreflang.lang])?;
            }

            let mut resources = tx.prepare(
                "INSERT INTO resources (page_report_id, crawl_id, kind, url) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let groups = [
                ("script", &report.scripts),
                ("style", &report.styles),
                ("iframe", &report.iframes),
                ("audio", &report.audios),
                ("video", &report.videos),
            ];
            for (kind, urls) in groups {
                for url in urls {
                    resources.execute(params![page_id, crawl_id, kind, url])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn save_end_crawl(&self, run: &CrawlRun) -> StorageResult<()> {
        let updated = self.conn().execute(
            "UPDATE crawls SET finished_at = ?1, total_urls = ?2, blocked_by_robots = ?3,
                noindex = ?4, internal_follow_links = ?5, internal_nofollow_links = ?6,
                external_follow_links = ?7, external_nofollow_links = ?8, sponsored_links = ?9,
                ugc_links = ?10, robotstxt_exists = ?11, sitemap_exists = ?12,
                sitemap_is_blocked = ?13, issues_total = ?14
             WHERE id = ?15",
            params![
                run.end.unwrap_or_else(Utc::now).to_rfc3339(),
                run.total_urls as i64,
                run.blocked_by_robots as i64,
                run.noindex as i64,
                run.internal_follow_links as i64,
                run.internal_nofollow_links as i64,
                run.external_follow_links as i64,
                run.external_nofollow_links as i64,
                run.sponsored_links as i64,
                run.ugc_links as i64,
                run.robotstxt_exists,
                run.sitemap_exists,
                run.sitemap_is_blocked,
                run.issues_total as i64,
                run.id,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run.id));
        }
        Ok(())
    }

    async fn get_last_crawls(&self, site_id: i64, limit: usize) -> StorageResult<Vec<CrawlRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CRAWL_COLUMNS} FROM crawls WHERE site_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let runs = stmt
            .query_map(params![site_id, limit as i64], crawl_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    async fn get_previous_crawl(&self, site_id: i64) -> StorageResult<Option<CrawlRun>> {
        let conn = self.conn();
        let run = conn
            .query_row(
                &format!(
                    "SELECT {CRAWL_COLUMNS} FROM crawls WHERE site_id = ?1
                     ORDER BY id DESC LIMIT 1 OFFSET 2"
                ),
                params![site_id],
                crawl_from_row,
            )
            .optional()?;
        Ok(run)
    }

    async fn delete_crawl_data(&self, run: &CrawlRun) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for table in CRAWL_DATA_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE crawl_id = ?1"),
                params![run.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn save_issue_count(&self, crawl_id: i64, count: &IssueCount) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO issue_counts (crawl_id, issue_type, count) VALUES (?1, ?2, ?3)",
            )?;
            for (issue, n) in count.iter() {
                stmt.execute(params![crawl_id, issue.to_db_string(), n as i64])?;
            }
        }
        tx.execute(
            "UPDATE crawls SET issues_total = ?1 WHERE id = ?2",
            params![count.total() as i64, crawl_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
