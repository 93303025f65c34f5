//! Run statistics loaded from the crawl database
//!
//! This module turns a finished [`CrawlRun`] and its issue-count snapshot
//! into the summary printed at the end of a crawl and by `--history`.

use crate::issues::IssueCount;
use crate::storage::{CrawlRun, SqliteStorage};
use crate::Result;

/// A finished run together with what was persisted for it
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run: CrawlRun,

    /// Page reports actually persisted (noindex pages may be skipped)
    pub stored_pages: u64,

    pub issues: IssueCount,
}

impl RunSummary {
    /// Share of URLs blocked by robots.txt, in percent
    pub fn blocked_ratio(&self) -> f64 {
        percentage(self.run.blocked_by_robots, self.run.total_urls)
    }

    pub fn internal_links(&self) -> u64 {
        self.run.internal_follow_links + self.run.internal_nofollow_links
    }

    pub fn external_links(&self) -> u64 {
        self.run.external_follow_links + self.run.external_nofollow_links
    }
}

/// Loads the summary of one run
///
/// # Arguments
///
/// * `storage` - The database holding the run
/// * `crawl_id` - Id of the run to summarize
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run and its persisted data
/// * `Err(AuditError)` - The run does not exist or the query failed
pub fn load_run_summary(storage: &SqliteStorage, crawl_id: i64) -> Result<RunSummary> {
    let run = storage.get_crawl(crawl_id)?;
    let stored_pages = storage.count_page_reports(crawl_id)?;
    let issues = storage.get_issue_count(crawl_id)?;

    Ok(RunSummary {
        run,
        stored_pages,
        issues,
    })
}

/// Prints a run summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    let run = &summary.run;

    println!("=== Crawl {} ===\n", run.id);

    if let (Some(start), Some(end)) = (run.start, run.end) {
        println!("Started:  {}", start.to_rfc3339());
        println!("Finished: {}", end.to_rfc3339());
        println!("Duration: {}s", (end - start).num_seconds());
        println!();
    }

    println!("Overview:");
    println!("  URLs crawled: {}", run.total_urls);
    println!("  Reports stored: {}", summary.stored_pages);
    println!(
        "  Blocked by robots.txt: {} ({:.1}%)",
        run.blocked_by_robots,
        summary.blocked_ratio()
    );
    println!("  Noindex pages: {}", run.noindex);
    println!();

    println!("Links:");
    println!(
        "  Internal: {} ({} nofollow)",
        summary.internal_links(),
        run.internal_nofollow_links
    );
    println!(
        "  External: {} ({} nofollow, {} sponsored, {} ugc)",
        summary.external_links(),
        run.external_nofollow_links,
        run.sponsored_links,
        run.ugc_links
    );
    println!();

    println!("Site:");
    println!("  robots.txt: {}", yes_no(run.robotstxt_exists));
    println!("  Sitemap: {}", yes_no(run.sitemap_exists));
    if run.sitemap_is_blocked {
        println!("  Sitemap is blocked by robots.txt");
    }
    println!();

    println!("Issues ({}):", summary.issues.total());
    let mut issues: Vec<_> = summary.issues.iter().collect();
    issues.sort_by(|a, b| b.1.cmp(&a.1));
    for (issue, count) in issues {
        println!("  {}: {}", issue, count);
    }
}

/// Prints the recent runs of a site, newest first
pub fn print_crawl_history(runs: &[CrawlRun]) {
    println!("=== Crawl History ===\n");

    for run in runs {
        if run.is_placeholder() {
            println!("  -");
            continue;
        }

        let started = run
            .start
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        let state = if run.end.is_some() { "" } else { " (unfinished)" };

        println!(
            "  #{} {}: {} URLs, {} issues{}",
            run.id, started, run.total_urls, run.issues_total, state
        );
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
