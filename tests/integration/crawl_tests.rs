//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and drive a full
//! crawl through the engine's result stream.

use std::collections::HashMap;
use std::time::Duration;
use sumi_audit::crawler::{BasicAuth, CrawlOptions, Crawler, EngineState, PageReport};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn test_options() -> CrawlOptions {
    CrawlOptions {
        workers: 2,
        user_agent: "TestAudit/1.0".to_string(),
        request_timeout: Duration::from_secs(5),
        ..CrawlOptions::default()
    }
}

/// Runs a crawl to completion and returns its reports keyed by URL
async fn crawl(seed: &str, options: CrawlOptions) -> (Crawler, HashMap<String, PageReport>) {
    let crawler = Crawler::new(seed, options).expect("Failed to create crawler");
    let mut stream = crawler
        .stream(CancellationToken::new())
        .expect("Failed to start stream");

    let mut reports = HashMap::new();
    while let Some(response) = stream.recv().await {
        let previous = reports.insert(response.report.url.clone(), response.report);
        assert!(previous.is_none(), "URL emitted twice");
    }
    (crawler, reports)
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        &format!(
            r#"<html lang="en"><head><title>Home</title></head><body>
            <h1>Welcome</h1>
            <a href="/page1">Page 1</a>
            <a href="{base}/page2#section">Page 2</a>
            <a href="https://other.example/" rel="sponsored">Partner</a>
            </body></html>"#
        ),
    )
    .await;
    mount_page(
        &server,
        "/page1",
        r#"<html><body><a href="/">Home</a><a href="/page2">Page 2</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/page2", "<html><body>Leaf</body></html>").await;

    let (crawler, reports) = crawl(&base, test_options()).await;

    assert_eq!(reports.len(), 3);
    assert_eq!(crawler.state(), EngineState::Drained);
    assert!(!crawler.robotstxt_exists());
    assert!(!crawler.sitemap_exists());

    let home = &reports[&format!("{base}/")];
    assert!(home.crawled);
    assert_eq!(home.status_code, 200);
    assert_eq!(home.depth, 0);
    assert_eq!(home.title, "Home");
    assert_eq!(home.h1, "Welcome");
    assert_eq!(home.lang, "en");
    assert_eq!(home.internal_links.len(), 2);
    assert_eq!(home.external_links.len(), 1);
    assert!(home.external_links[0].sponsored);
    assert_eq!(home.external_links[0].status_code, None);

    let page2 = &reports[&format!("{base}/page2")];
    assert_eq!(page2.depth, 1);
    assert!(page2.crawled);
}

#[tokio::test]
async fn test_page_cap_limits_reports() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/p{i}">{i}</a>"#))
        .collect();
    mount_page(&server, "/", &format!("<html><body>{links}</body></html>")).await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>Leaf</body></html>"))
        .mount(&server)
        .await;

    let options = CrawlOptions {
        max_page_reports: 3,
        crawl_sitemap: false,
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;

    assert_eq!(reports.len(), 3);
    assert!(reports.contains_key(&format!("{base}/")));
}

#[tokio::test]
async fn test_timeout_is_reported_uncrawled() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<html><body><a href="/slow">Slow</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let options = CrawlOptions {
        request_timeout: Duration::from_millis(300),
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;

    assert_eq!(reports.len(), 2);
    let slow = &reports[&format!("{base}/slow")];
    assert!(!slow.crawled);
    assert_eq!(slow.error.as_deref(), Some("Request timeout"));
}

#[tokio::test]
async fn test_robots_txt_is_respected() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/private/a">Secret</a><a href="/public">Public</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/public", "<html><body>Public</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/private/a"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let (crawler, reports) = crawl(&base, test_options()).await;

    assert!(crawler.robotstxt_exists());
    assert_eq!(reports.len(), 2);
    assert!(!reports.contains_key(&format!("{base}/private/a")));

    // The link is still recorded on the page that contains it
    let home = &reports[&format!("{base}/")];
    assert_eq!(home.internal_links.len(), 2);
}

#[tokio::test]
async fn test_blocked_seed_is_reported() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;

    let (_, reports) = crawl(&base, test_options()).await;

    assert_eq!(reports.len(), 1);
    let seed = &reports[&format!("{base}/")];
    assert!(seed.blocked_by_robots);
    assert!(!seed.crawled);
}

#[tokio::test]
async fn test_ignore_robots_txt() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;
    mount_page(&server, "/", "<html><body>Home</body></html>").await;

    let options = CrawlOptions {
        ignore_robots_txt: true,
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;

    let seed = &reports[&format!("{base}/")];
    assert!(seed.crawled);
    assert!(!seed.blocked_by_robots);
}

#[tokio::test]
async fn test_redirect_is_recorded_and_followed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/new", "<html><body>Moved here</body></html>").await;

    let (_, reports) = crawl(&base, test_options()).await;

    assert_eq!(reports.len(), 2);
    let old = &reports[&format!("{base}/")];
    assert_eq!(old.status_code, 301);
    assert!(old.crawled);
    assert!(old.is_redirect());
    assert_eq!(old.redirect_url, format!("{base}/new"));

    let new = &reports[&format!("{base}/new")];
    assert_eq!(new.status_code, 200);
    assert_eq!(new.depth, 1);
}

#[tokio::test]
async fn test_nofollow_links_not_enqueued() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/followed">A</a><a href="/hidden" rel="nofollow">B</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>Leaf</body></html>"))
        .mount(&server)
        .await;

    let (_, reports) = crawl(&base, test_options()).await;
    assert_eq!(reports.len(), 2);
    assert!(!reports.contains_key(&format!("{base}/hidden")));

    let home = &reports[&format!("{base}/")];
    assert_eq!(home.internal_links.iter().filter(|l| l.nofollow).count(), 1);

    let options = CrawlOptions {
        follow_nofollow: true,
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;
    assert_eq!(reports.len(), 3);
    assert!(reports.contains_key(&format!("{base}/hidden")));
}

#[tokio::test]
async fn test_sitemap_urls_are_seeded() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("User-agent: *\nAllow: /\nSitemap: {base}/sitemap.xml\n")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <url><loc>{base}/orphan</loc></url>
                </urlset>"#
            )
            .into_bytes(),
            "application/xml",
        ))
        .mount(&server)
        .await;
    mount_page(&server, "/", "<html><body>No links here</body></html>").await;
    mount_page(&server, "/orphan", "<html><body>Only in the sitemap</body></html>").await;

    let (crawler, reports) = crawl(&base, test_options()).await;

    assert!(crawler.sitemap_exists());
    assert!(!crawler.sitemap_is_blocked());
    assert_eq!(reports.len(), 2);

    let orphan = &reports[&format!("{base}/orphan")];
    assert!(orphan.in_sitemap);
    assert!(orphan.crawled);
    assert!(!reports[&format!("{base}/")].in_sitemap);

    let options = CrawlOptions {
        crawl_sitemap: false,
        ..test_options()
    };
    let (crawler, reports) = crawl(&base, options).await;
    assert!(crawler.sitemap_exists());
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn test_basic_auth_sent_to_matching_hosts_only() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(html("<html><body>Staging</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let auth = |domain: &str| BasicAuth {
        username: "user".to_string(),
        password: "pass".to_string(),
        domains: vec![domain.to_string()],
    };

    let options = CrawlOptions {
        basic_auth: Some(auth("127.0.0.1")),
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;
    assert_eq!(reports[&format!("{base}/")].status_code, 200);

    let options = CrawlOptions {
        basic_auth: Some(auth("staging.example.com")),
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;
    assert_eq!(reports[&format!("{base}/")].status_code, 401);
}

#[tokio::test]
async fn test_stop_drains_stream() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..50)
        .map(|i| format!(r#"<a href="/p{i}">{i}</a>"#))
        .collect();
    mount_page(&server, "/", &format!("<html><body>{links}</body></html>")).await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>").set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let options = CrawlOptions {
        workers: 1,
        crawl_sitemap: false,
        ..test_options()
    };
    let crawler = Crawler::new(&base, options).unwrap();
    let mut stream = crawler.stream(CancellationToken::new()).unwrap();

    let first = stream.recv().await.expect("Seed report");
    assert_eq!(first.report.url, format!("{base}/"));
    crawler.stop();
    crawler.stop();

    let mut rest = 0;
    while stream.recv().await.is_some() {
        rest += 1;
    }

    // At most the URL already in flight completes
    assert!(rest <= 1, "{rest} reports after stop");
    assert_eq!(crawler.state(), EngineState::Drained);
}

#[tokio::test]
async fn test_cancel_closes_stream() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<html><body><a href="/slow">Slow</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let options = CrawlOptions {
        workers: 1,
        ..test_options()
    };
    let crawler = Crawler::new(&base, options).unwrap();
    let cancel = CancellationToken::new();
    let mut stream = crawler.stream(cancel.clone()).unwrap();

    let first = stream.recv().await.expect("Seed report");
    assert!(first.report.crawled);
    cancel.cancel();

    let rest = tokio::time::timeout(Duration::from_secs(2), async {
        let mut reports = Vec::new();
        while let Some(response) = stream.recv().await {
            reports.push(response.report);
        }
        reports
    })
    .await
    .expect("Stream did not close after cancel");

    for report in rest {
        assert!(!report.crawled);
        assert_eq!(report.error.as_deref(), Some("Crawl cancelled"));
    }
}

#[tokio::test]
async fn test_external_links_head_checked_once() {
    let server = MockServer::start().await;
    let external = MockServer::start().await;
    let base = server.uri();

    // Reached through `localhost` so it is out of the 127.0.0.1 seed's scope
    let other = format!("http://localhost:{}", external.address().port());
    let links = format!(r#"<a href="{other}/live">Live</a><a href="{other}/dead">Dead</a>"#);

    mount_page(
        &server,
        "/",
        &format!(r#"<html><body>{links}<a href="/second">Second</a></body></html>"#),
    )
    .await;
    mount_page(&server, "/second", &format!("<html><body>{links}</body></html>")).await;

    Mock::given(method("HEAD"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&external)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/dead"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&external)
        .await;

    let options = CrawlOptions {
        check_external_links: true,
        ..test_options()
    };
    let (_, reports) = crawl(&base, options).await;

    assert_eq!(reports.len(), 2);
    for page in ["/", "/second"] {
        let mut statuses: Vec<(String, Option<u16>)> = reports[&format!("{base}{page}")]
            .external_links
            .iter()
            .map(|link| (link.url.clone(), link.status_code))
            .collect();
        statuses.sort();
        assert_eq!(
            statuses,
            vec![
                (format!("{other}/dead"), Some(404)),
                (format!("{other}/live"), Some(200)),
            ]
        );
    }

    // Unchecked by default
    let (_, reports) = crawl(&base, test_options()).await;
    assert!(reports[&format!("{base}/")]
        .external_links
        .iter()
        .all(|link| link.status_code.is_none()));

    external.verify().await;
}
