//! Sumi-Audit main entry point
//!
//! This is the command-line interface for the Sumi-Audit SEO auditor.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_audit::config::{load_config, Config};
use sumi_audit::issues::{IssueCache, IssueReporter};
use sumi_audit::output::{load_run_summary, print_crawl_history, print_run_summary};
use sumi_audit::service::{crawl_topic, Broker, Message};
use sumi_audit::storage::open_storage;
use sumi_audit::{normalize_url, CrawlerService, Site};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Sumi-Audit: a polite SEO auditor
///
/// Sumi-Audit crawls a website while respecting robots.txt and the site's
/// scope, records what it finds about every page, and reports SEO issues.
#[derive(Parser, Debug)]
#[command(name = "sumi-audit")]
#[command(version = "1.0.0")]
#[command(about = "A polite SEO auditor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Site to audit
    #[arg(value_name = "URL")]
    url: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "history")]
    dry_run: bool,

    /// Show the last N crawls of the site and exit
    #[arg(long, value_name = "N", conflicts_with = "dry_run")]
    history: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let seed = normalize_url(&cli.url).with_context(|| format!("Invalid site URL '{}'", cli.url))?;

    if cli.dry_run {
        handle_dry_run(&config, seed.as_str());
        return Ok(());
    }

    let storage = Arc::new(
        open_storage(Path::new(&config.output.database_path))
            .context("Failed to open the crawl database")?,
    );
    let site_id = storage.upsert_site(seed.as_str())?;
    let site = Site::new(site_id, seed.as_str(), config.crawl_options());

    let cache = Arc::new(IssueCache::new());
    let reporter = Arc::new(IssueReporter::new(storage.clone(), cache.clone()));
    let broker = Arc::new(Broker::new());
    let service = CrawlerService::new(storage.clone(), reporter, cache, broker.clone());

    if let Some(n) = cli.history {
        let runs = service.get_last_crawls(site_id, n).await?;
        print_crawl_history(&runs);
        return Ok(());
    }

    tokio::spawn(log_progress(broker.subscribe(&crawl_topic(site_id))));

    let stopper = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight pages");
            stopper.stop_crawler(site_id);
        }
    });

    let run = service
        .start_crawler(&site)
        .await
        .with_context(|| format!("Crawl of {} failed", site.url))?;

    let summary = load_run_summary(&storage, run.id)?;
    print_run_summary(&summary);

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_audit=info,warn"),
            1 => EnvFilter::new("sumi_audit=debug,info"),
            2 => EnvFilter::new("sumi_audit=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Logs crawl events until the topic closes
async fn log_progress(mut events: broadcast::Receiver<Message>) {
    loop {
        match events.recv().await {
            Ok(Message::PageReport {
                url,
                status_code,
                crawled,
                blocked_by_robots,
                total_urls,
            }) => {
                if blocked_by_robots {
                    tracing::info!("[{}] blocked by robots.txt: {}", total_urls, url);
                } else if !crawled {
                    tracing::warn!("[{}] not crawled: {}", total_urls, url);
                } else {
                    tracing::info!("[{}] {} {}", total_urls, status_code, url);
                }
            }
            Ok(Message::IssuesInit { crawl_id }) => {
                tracing::info!("Detecting issues of crawl {}", crawl_id);
            }
            Ok(Message::CrawlEnd { .. }) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Progress log skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seed: &str) {
    let options = config.crawl_options();

    println!("=== Sumi-Audit Dry Run ===\n");

    println!("Site: {}", seed);

    println!("\nCrawler Configuration:");
    println!("  Max page reports: {}", options.max_page_reports);
    println!("  Workers: {}", options.workers);
    println!("  Request timeout: {}ms", options.request_timeout.as_millis());
    println!("  Ignore robots.txt: {}", options.ignore_robots_txt);
    println!("  Follow nofollow: {}", options.follow_nofollow);
    println!("  Include noindex: {}", options.include_noindex);
    println!("  Crawl sitemap: {}", options.crawl_sitemap);
    println!("  Allow subdomains: {}", options.allow_subdomains);
    println!("  Check external links: {}", options.check_external_links);

    println!("\nUser Agent: {}", options.user_agent);
    println!("  robots.txt token: {}", options.robots_agent());

    if let Some(auth) = &options.basic_auth {
        println!("\nBasic auth as '{}' for:", auth.username);
        for domain in &auth.domains {
            println!("  - {}", domain);
        }
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}
