//! Integration tests for the crawl orchestrator
//!
//! A real SQLite database in a temporary directory backs the service, and
//! wiremock serves the audited site.

use std::sync::Arc;
use std::time::Duration;
use sumi_audit::crawler::CrawlOptions;
use sumi_audit::issues::{IssueCache, IssueReporter, IssueType};
use sumi_audit::service::{crawl_topic, Broker, Message};
use sumi_audit::storage::{open_storage, SqliteStorage, Store};
use sumi_audit::{AuditError, CrawlerService, Site};
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    service: CrawlerService,
    storage: Arc<SqliteStorage>,
    cache: Arc<IssueCache>,
    broker: Arc<Broker>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(open_storage(&dir.path().join("audit.db")).unwrap());
    let cache = Arc::new(IssueCache::new());
    let reporter = Arc::new(IssueReporter::new(storage.clone(), cache.clone()));
    let broker = Arc::new(Broker::new());
    let service = CrawlerService::new(storage.clone(), reporter, cache.clone(), broker.clone());

    Harness {
        service,
        storage,
        cache,
        broker,
        _dir: dir,
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

fn options() -> CrawlOptions {
    CrawlOptions {
        workers: 2,
        user_agent: "TestAudit/1.0".to_string(),
        ..CrawlOptions::default()
    }
}

fn site(harness: &Harness, url: &str, options: CrawlOptions) -> Site {
    let seed = format!("{}/", url.trim_end_matches('/'));
    let id = harness.storage.upsert_site(&seed).unwrap();
    Site::new(id, seed, options)
}

fn drain(events: &mut broadcast::Receiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(message) = events.try_recv() {
        messages.push(message);
    }
    messages
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_run_aggregates_and_persistence() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html lang="en"><head><title>Home</title>
            <meta name="description" content="Home page"></head><body><h1>Home</h1>
            <a href="/a">A</a><a href="/b">B</a><a href="/c">C</a>
            <a href="/n1" rel="nofollow">N1</a><a href="/n2" rel="nofollow">N2</a>
            <a href="https://partner.example/" rel="sponsored">Partner</a>
            <a href="https://forum.example/" rel="nofollow">Forum</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(
            r#"<html lang="en"><head><title>Same</title></head><body><h1>Leaf</h1></body></html>"#,
        ))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());
    let mut events = harness.broker.subscribe(&crawl_topic(site.id));

    let run = harness.service.start_crawler(&site).await.unwrap();

    assert_eq!(run.total_urls, 4);
    assert_eq!(run.internal_follow_links, 3);
    assert_eq!(run.internal_nofollow_links, 2);
    assert_eq!(run.external_follow_links, 1);
    assert_eq!(run.external_nofollow_links, 1);
    assert_eq!(run.sponsored_links, 1);
    assert_eq!(run.ugc_links, 0);
    assert_eq!(run.blocked_by_robots, 0);
    assert!(run.end.is_some());
    assert!(!harness.service.is_crawling(site.id));

    let stored = harness.storage.get_crawl(run.id).unwrap();
    assert_eq!(stored, run);
    assert_eq!(harness.storage.count_page_reports(run.id).unwrap(), 4);

    // The three leaves share a title and lack a description
    let issues = harness.storage.get_issue_count(run.id).unwrap();
    assert_eq!(issues.get(IssueType::DuplicatedTitle), 3);
    assert_eq!(issues.get(IssueType::DescriptionMissing), 3);
    assert_eq!(issues.get(IssueType::TitleMissing), 0);
    assert_eq!(run.issues_total, issues.total());
    assert_eq!(harness.cache.get(run.id), Some(issues));

    let messages = drain(&mut events);
    assert_eq!(messages.len(), 6);
    assert!(messages[..4].iter().all(|m| m.name() == "PageReport"));
    assert_eq!(messages[4], Message::IssuesInit { crawl_id: run.id });
    assert_eq!(
        messages[5],
        Message::CrawlEnd {
            crawl_id: run.id,
            total_urls: 4,
            issues_total: run.issues_total,
        }
    );
    assert!(matches!(
        messages[3],
        Message::PageReport { total_urls: 4, .. }
    ));
}

#[tokio::test]
async fn test_noindex_pages_counted_but_not_stored() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><meta name="robots" content="noindex"></head>
            <body><a href="/visible">Visible</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/visible"))
        .respond_with(html("<html><body>Visible</body></html>"))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());
    let run = harness.service.start_crawler(&site).await.unwrap();

    assert_eq!(run.total_urls, 2);
    assert_eq!(run.noindex, 1);
    assert_eq!(harness.storage.count_page_reports(run.id).unwrap(), 1);

    let site = Site::new(
        site.id,
        site.url.clone(),
        CrawlOptions {
            include_noindex: true,
            ..options()
        },
    );
    let run = harness.service.start_crawler(&site).await.unwrap();
    assert_eq!(harness.storage.count_page_reports(run.id).unwrap(), 2);
    assert_eq!(
        harness.storage.get_issue_count(run.id).unwrap().get(IssueType::Noindex),
        1
    );
}

#[tokio::test]
async fn test_robots_and_sitemap_facts_recorded() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: *\nDisallow: /sitemap.xml\nDisallow: /private\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<html><body><a href="/private">P</a></body></html>"#))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());
    let run = harness.service.start_crawler(&site).await.unwrap();

    assert!(run.robotstxt_exists);
    assert!(run.sitemap_is_blocked);
    assert!(!run.sitemap_exists);
    assert_eq!(run.total_urls, 1);

    let stored = harness.storage.get_crawl(run.id).unwrap();
    assert!(stored.robotstxt_exists);
    assert!(stored.sitemap_is_blocked);
}

#[tokio::test]
async fn test_duplicate_start_is_rejected() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .respond_with(html("<html><body>Slow</body></html>").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());

    let service = harness.service.clone();
    let first_site = site.clone();
    let first = tokio::spawn(async move { service.start_crawler(&first_site).await });

    assert!(wait_until(|| harness.service.is_crawling(site.id)).await);

    let second = harness.service.start_crawler(&site).await;
    assert!(matches!(
        second,
        Err(AuditError::AlreadyCrawling { site_id }) if site_id == site.id
    ));

    let run = first.await.unwrap().unwrap();
    assert_eq!(run.total_urls, 1);
    assert!(!harness.service.is_crawling(site.id));

    // Only the first start persisted a run
    let runs = harness.service.get_last_crawls(site.id, 5).await.unwrap();
    assert_eq!(runs.iter().filter(|r| !r.is_placeholder()).count(), 1);
}

#[tokio::test]
async fn test_stop_crawler_finishes_early() {
    let server = MockServer::start().await;
    let harness = harness();

    let links: String = (0..40)
        .map(|i| format!(r#"<a href="/p{i}">{i}</a>"#))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!("<html><body>{links}</body></html>")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>").set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let site = site(
        &harness,
        &server.uri(),
        CrawlOptions {
            crawl_sitemap: false,
            ..options()
        },
    );
    let mut events = harness.broker.subscribe(&crawl_topic(site.id));

    let service = harness.service.clone();
    let crawl_site = site.clone();
    let crawl = tokio::spawn(async move { service.start_crawler(&crawl_site).await });

    // Stop once the seed has been processed
    match events.recv().await.unwrap() {
        Message::PageReport { url, .. } => assert_eq!(url, site.url),
        other => panic!("unexpected event {}", other.name()),
    }
    assert!(harness.service.stop_crawler(site.id));

    let run = crawl.await.unwrap().unwrap();
    assert!(run.total_urls < 41, "stop had no effect");
    assert!(run.end.is_some());
    assert!(!harness.service.is_crawling(site.id));
    assert!(!harness.service.stop_crawler(site.id));
}

#[tokio::test]
async fn test_last_crawls_padded_with_placeholders() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .respond_with(html("<html><body>Home</body></html>"))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());

    let runs = harness.service.get_last_crawls(site.id, 2).await.unwrap();
    assert!(runs.iter().all(|r| r.is_placeholder()));

    let run = harness.service.start_crawler(&site).await.unwrap();
    let runs = harness.service.get_last_crawls(site.id, 3).await.unwrap();

    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].id, run.id);
    assert!(runs[1].is_placeholder());
    assert!(runs[2].is_placeholder());
}

#[tokio::test]
async fn test_cleanup_of_superseded_runs() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .respond_with(html("<html><body>Home</body></html>"))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());

    let first = harness.service.start_crawler(&site).await.unwrap();
    let second = harness.service.start_crawler(&site).await.unwrap();
    assert!(harness.cache.get(first.id).is_some());

    let third = harness.service.start_crawler(&site).await.unwrap();

    let storage = harness.storage.clone();
    assert!(
        wait_until(|| storage.count_page_reports(first.id).unwrap() == 0).await,
        "first run data was not cleaned up"
    );
    assert!(wait_until(|| harness.cache.get(first.id).is_none()).await);

    assert_eq!(harness.storage.count_page_reports(second.id).unwrap(), 1);
    assert_eq!(harness.storage.count_page_reports(third.id).unwrap(), 1);
    assert!(harness.cache.get(third.id).is_some());

    // The run record itself is kept for the history
    let runs = harness.service.get_last_crawls(site.id, 3).await.unwrap();
    let ids: Vec<i64> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);
}

#[tokio::test]
async fn test_cleanup_target_fixed_when_run_finishes() {
    let server = MockServer::start().await;
    let harness = harness();

    Mock::given(method("GET"))
        .respond_with(html("<html><body>Home</body></html>"))
        .mount(&server)
        .await;

    let site = site(&harness, &server.uri(), options());

    let first = harness.service.start_crawler(&site).await.unwrap();
    let second = harness.service.start_crawler(&site).await.unwrap();
    let third = harness.service.start_crawler(&site).await.unwrap();

    // A new run of the site is recorded before the cleanup task gets to run
    let next = harness.storage.save_crawl(&site).await.unwrap();
    assert!(next.id > third.id);

    let storage = harness.storage.clone();
    assert!(
        wait_until(|| storage.count_page_reports(first.id).unwrap() == 0).await,
        "first run data was not cleaned up"
    );
    assert_eq!(harness.storage.count_page_reports(second.id).unwrap(), 1);
    assert_eq!(harness.storage.count_page_reports(third.id).unwrap(), 1);
}
