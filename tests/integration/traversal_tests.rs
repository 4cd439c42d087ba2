//! Integration tests for the traversal engine
//!
//! These tests use wiremock to serve a small paginated source and drive
//! complete runs against a SQLite archive in a temporary directory.

use std::path::Path;
use std::time::Duration;
use sumi_chronicle::config::{Config, OutputConfig, SourceConfig, TraversalConfig, UserAgentConfig};
use sumi_chronicle::crawler::{Mode, SourceLock, Traversal};
use sumi_chronicle::dates::{Confidence, DateStrategy, ResolvedDate};
use sumi_chronicle::output::{ArchiveSink, CollectingSink, OutputResult};
use sumi_chronicle::state::{PaginationEnd, StopReason};
use sumi_chronicle::storage::{ArchivedItem, NewItem, RunStatus, SqliteStorage, Storage};
use sumi_chronicle::url::canonicalize_url;
use sumi_chronicle::ChronicleError;
use tempfile::TempDir;
use tokio::sync::watch;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_2: &str = "/search?updated-max=2015-03-01T00:00:00Z";
const PAGE_3: &str = "/search?updated-max=2015-02-01T00:00:00Z";

/// Creates a test configuration for a source served by `server`
fn create_test_config(server: &MockServer, db_path: &Path, mode: Mode) -> Config {
    Config {
        source: SourceConfig {
            base_url: format!("{}/", server.uri()),
            earliest_date: Some("2008-01-01".to_string()),
            keywords: vec![],
        },
        traversal: TraversalConfig {
            mode,
            page_delay_secs: 0.0,
            max_attempts: 3,
            request_timeout_secs: 5,
            ..Default::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.display().to_string(),
            json_lines_path: None,
            export_path: None,
        },
    }
}

/// Renders a listing page with one article per item path
fn listing(items: &[(&str, &str)], older: Option<&str>) -> String {
    let articles: String = items
        .iter()
        .map(|(href, title)| {
            format!(
                r#"<article class="post">
                     <h3 class="post-title"><a href="{}">{}</a></h3>
                     <div class="post-body">Body of {}</div>
                   </article>"#,
                href, title, title
            )
        })
        .collect();
    let pager = older
        .map(|href| format!(r#"<a class="blog-pager-older-link" href="{}">Older Posts</a>"#, href))
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", articles, pager)
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

const PAGE_1_ITEMS: [(&str, &str); 2] = [
    ("/2015/03/a1.html", "March one"),
    ("/2015/03/a2.html", "March two"),
];
const PAGE_2_ITEMS: [(&str, &str); 2] = [
    ("/2015/02/b1.html", "February one"),
    ("/2015/02/b2.html", "February two"),
];
const PAGE_3_ITEMS: [(&str, &str); 2] = [
    ("/2015/01/c1.html", "January one"),
    ("/2015/01/c2.html", "January two"),
];

async fn mount_page_1(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&PAGE_1_ITEMS, Some(PAGE_2))))
        .mount(server)
        .await;
}

async fn mount_page_2(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("updated-max", "2015-03-01T00:00:00Z"))
        .respond_with(html(listing(&PAGE_2_ITEMS, Some(PAGE_3))))
        .mount(server)
        .await;
}

/// Mounts the three-page source
async fn mount_source(server: &MockServer) {
    mount_page_1(server).await;
    mount_page_2(server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("updated-max", "2015-02-01T00:00:00Z"))
        .respond_with(html(listing(&PAGE_3_ITEMS, None)))
        .mount(server)
        .await;
}

fn traversal(
    config: Config,
    sinks: Vec<Box<dyn ArchiveSink>>,
) -> (Traversal<SqliteStorage>, watch::Sender<bool>) {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .expect("Failed to open storage");
    let (tx, rx) = watch::channel(false);
    let traversal = Traversal::new(config, storage, sinks, rx).expect("Failed to build traversal");
    (traversal, tx)
}

#[tokio::test]
async fn test_full_historical_walks_every_page() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let collector = CollectingSink::new();
    let config = create_test_config(&server, &db, Mode::FullHistorical);
    let (mut traversal, _tx) = traversal(config, vec![Box::new(collector.clone())]);

    let summary = traversal.run().await.expect("Run failed");

    assert_eq!(
        summary.stop_reason,
        StopReason::NoNextPage(PaginationEnd::Exhausted)
    );
    assert_eq!(summary.stop_reason.to_db_string(), "no_next_page");
    assert_eq!(summary.items_accepted, 6);
    assert_eq!(summary.pages_visited, 3);
    assert!(summary.failure.is_none());

    // Sinks saw every acceptance in page order, then the summary
    let accepted = collector.accepted();
    assert_eq!(accepted.len(), 6);
    assert_eq!(accepted[0].title, "March one");
    assert_eq!(accepted[5].title, "January two");
    assert_eq!(collector.summaries().len(), 1);

    let storage = traversal.storage();
    assert_eq!(storage.count_items().unwrap(), 6);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.items_accepted, 6);
}

#[tokio::test]
async fn test_incremental_after_full_run_is_caught_up() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let (mut full, _tx) = traversal(create_test_config(&server, &db, Mode::FullHistorical), vec![]);
    full.run().await.expect("Full run failed");
    drop(full);

    let (mut incremental, _tx) =
        traversal(create_test_config(&server, &db, Mode::Incremental), vec![]);
    let summary = incremental.run().await.expect("Incremental run failed");

    assert_eq!(summary.stop_reason, StopReason::CaughtUp);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.items_accepted, 0);
    assert_eq!(summary.items_duplicate, 2);
}

#[tokio::test]
async fn test_second_full_run_adds_nothing() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    for expected_new in [6, 0] {
        let (mut run, _tx) =
            traversal(create_test_config(&server, &db, Mode::FullHistorical), vec![]);
        let summary = run.run().await.expect("Run failed");
        assert_eq!(summary.items_accepted, expected_new);
        assert_eq!(summary.pages_visited, 3);
        assert_eq!(run.storage().count_items().unwrap(), 6);
    }
}

#[tokio::test]
async fn test_self_link_stops_after_one_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&PAGE_1_ITEMS, Some("/"))))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::FullHistorical), vec![]);

    let summary = run.run().await.expect("Run failed");
    assert_eq!(
        summary.stop_reason,
        StopReason::NoNextPage(PaginationEnd::SelfLink)
    );
    assert_eq!(summary.pages_visited, 1);

    let stored = run.storage().get_run(summary.run_id).unwrap();
    assert_eq!(
        stored.stop_reason,
        Some(StopReason::NoNextPage(PaginationEnd::SelfLink))
    );
}

#[tokio::test]
async fn test_incremental_stops_after_two_empty_pages() {
    let server = MockServer::start().await;
    mount_page_1(&server).await;
    mount_page_2(&server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("updated-max", "2015-02-01T00:00:00Z"))
        .respond_with(html(listing(&PAGE_3_ITEMS, None)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    // Pages 1 and 2 were archived out of band; no earlier run exists
    {
        let mut storage = SqliteStorage::new(&db).unwrap();
        for (href, title) in PAGE_1_ITEMS.iter().chain(PAGE_2_ITEMS.iter()) {
            let url = canonicalize_url(&format!("{}{}", server.uri(), href)).unwrap();
            let outcome = storage
                .try_accept(&NewItem {
                    link_url: url.clone(),
                    canonical_url: url,
                    title: title.to_string(),
                    snippet: String::new(),
                    content: None,
                    resolved: ResolvedDate::unresolved(),
                    match_rationale: "all".to_string(),
                    first_seen_run: None,
                })
                .unwrap();
            assert!(outcome.is_accepted());
        }
    }

    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::Incremental), vec![]);
    let summary = run.run().await.expect("Run failed");

    assert_eq!(summary.stop_reason, StopReason::CaughtUp);
    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.items_accepted, 0);
}

#[tokio::test]
async fn test_bounded_run_respects_page_cap() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let mut config = create_test_config(&server, &db, Mode::BoundedHistorical);
    config.traversal.page_cap = Some(2);
    let (mut run, _tx) = traversal(config, vec![]);

    let summary = run.run().await.expect("Run failed");
    assert_eq!(summary.stop_reason, StopReason::PageLimitReached);
    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.items_accepted, 4);
}

#[tokio::test]
async fn test_robots_denial_ends_run_with_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&PAGE_1_ITEMS, None)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::Incremental), vec![]);

    let summary = run.run().await.expect("Denied run still reports");
    assert_eq!(summary.stop_reason, StopReason::FetchError);
    assert_eq!(summary.pages_visited, 0);
    assert!(summary.failure.unwrap().contains("robots.txt"));

    let stored = run.storage().get_run(summary.run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_unreadable_robots_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_page_1(&server).await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::Incremental), vec![]);

    let summary = run.run().await.expect("Denied run still reports");
    assert_eq!(summary.stop_reason, StopReason::FetchError);
    assert_eq!(run.storage().count_items().unwrap(), 0);
}

#[tokio::test]
async fn test_page_failure_keeps_earlier_commits() {
    let server = MockServer::start().await;
    mount_page_1(&server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::FullHistorical), vec![]);

    let summary = run.run().await.expect("Failed run still reports");
    assert_eq!(summary.stop_reason, StopReason::FetchError);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.items_accepted, 2);
    assert_eq!(run.storage().count_items().unwrap(), 2);
}

#[tokio::test]
async fn test_exhausted_rate_limit_fails_run_and_keeps_commits() {
    let server = MockServer::start().await;
    mount_page_1(&server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let mut config = create_test_config(&server, &db, Mode::FullHistorical);
    config.traversal.max_attempts = 2;
    let (mut run, _tx) = traversal(config, vec![]);

    let summary = tokio::time::timeout(Duration::from_secs(20), run.run())
        .await
        .expect("Rate limited run did not end")
        .expect("Failed run still reports");

    assert_eq!(summary.stop_reason, StopReason::FetchError);
    assert!(summary
        .failure
        .as_deref()
        .is_some_and(|failure| failure.starts_with("Rate limited")));
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.items_accepted, 2);
    assert_eq!(run.storage().count_items().unwrap(), 2);

    let stored = run.storage().get_run(summary.run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&PAGE_1_ITEMS, None)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::FullHistorical), vec![]);

    let summary = run.run().await.expect("Run failed");
    assert_eq!(
        summary.stop_reason,
        StopReason::NoNextPage(PaginationEnd::Exhausted)
    );
    assert_eq!(summary.items_accepted, 2);
}

/// Sink that raises the cancel flag on the first accepted item
struct CancelOnAccept(watch::Sender<bool>);

impl ArchiveSink for CancelOnAccept {
    fn name(&self) -> &str {
        "cancel"
    }

    fn on_accepted(&mut self, _item: &ArchivedItem) -> OutputResult<()> {
        let _ = self.0.send(true);
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_stops_cleanly_between_pages() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let config = create_test_config(&server, &db, Mode::FullHistorical);
    let storage = SqliteStorage::new(&db).unwrap();
    let (tx, rx) = watch::channel(false);
    let sinks: Vec<Box<dyn ArchiveSink>> = vec![Box::new(CancelOnAccept(tx))];
    let mut run = Traversal::new(config, storage, sinks, rx).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), run.run())
        .await
        .expect("Cancellation did not stop the run")
        .expect("Run failed");

    // The page in flight is finished before the flag is honored
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.items_accepted, 2);

    let stored = run.storage().get_run(summary.run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Interrupted);
    assert_eq!(run.storage().count_items().unwrap(), 2);
}

#[tokio::test]
async fn test_cancellation_interrupts_page_delay() {
    let server = MockServer::start().await;
    mount_source(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let mut config = create_test_config(&server, &db, Mode::FullHistorical);
    config.traversal.page_delay_secs = 30.0;
    let (mut run, tx) = traversal(config, vec![]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), run.run())
        .await
        .expect("Cancellation did not interrupt the delay")
        .expect("Run failed");

    // The robots fetch starts the delay clock, so no page was reached
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.pages_visited, 0);
    assert_eq!(run.storage().count_items().unwrap(), 0);
    let stored = run.storage().get_run(summary.run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_keywords_filter_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(
            &[
                ("/2015/03/a1.html", "Notes on the Quran"),
                ("/2015/03/a2.html", "Weekend weather"),
            ],
            None,
        )))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let mut config = create_test_config(&server, &db, Mode::Incremental);
    config.source.keywords = vec!["quran".to_string()];

    let collector = CollectingSink::new();
    let (mut run, _tx) = traversal(config, vec![Box::new(collector.clone())]);

    let summary = run.run().await.expect("Run failed");
    assert_eq!(summary.items_seen, 2);
    assert_eq!(summary.items_accepted, 1);
    assert_eq!(summary.items_filtered, 1);

    let accepted = collector.accepted();
    assert_eq!(accepted[0].match_rationale, "keyword:quran");
}

#[tokio::test]
async fn test_detail_pages_supply_date_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[("/2015/03/a1.html", "March one")], None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2015/03/a1.html"))
        .respond_with(html(
            r#"<html><head>
                 <meta property="article:published_time" content="2015-03-07T09:30:00Z">
               </head><body>
                 <div class="post-body"><p>Full text of the first March post.</p></div>
               </body></html>"#
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let mut config = create_test_config(&server, &db, Mode::Incremental);
    config.traversal.fetch_detail_pages = true;

    let collector = CollectingSink::new();
    let (mut run, _tx) = traversal(config, vec![Box::new(collector.clone())]);
    run.run().await.expect("Run failed");

    let accepted = collector.accepted();
    assert_eq!(accepted.len(), 1);
    let item = &accepted[0];
    assert_eq!(item.date_strategy, DateStrategy::MetaTag);
    assert_eq!(item.date_confidence, Confidence::High);
    assert_eq!(item.resolved_date.unwrap().to_string(), "2015-03-07");
    assert_eq!(
        item.content.as_deref(),
        Some("Full text of the first March post.")
    );
    assert_eq!(item.word_count, Some(7));
}

#[tokio::test]
async fn test_detail_page_is_fetched_at_linked_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[("/2015/03/a1.html?m=1", "March one")], None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2015/03/a1.html"))
        .and(query_param("m", "1"))
        .respond_with(html(
            r#"<html><head>
                 <meta property="article:published_time" content="2015-03-07T09:30:00Z">
               </head><body><div class="post-body"><p>Linked copy.</p></div></body></html>"#
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let mut config = create_test_config(&server, &db, Mode::Incremental);
    config.traversal.fetch_detail_pages = true;

    let collector = CollectingSink::new();
    let (mut run, _tx) = traversal(config, vec![Box::new(collector.clone())]);
    run.run().await.expect("Run failed");

    let accepted = collector.accepted();
    assert_eq!(accepted.len(), 1);
    let item = &accepted[0];
    let canonical = canonicalize_url(&format!("{}/2015/03/a1.html", server.uri())).unwrap();
    assert_eq!(item.canonical_url, canonical.as_str());
    assert_eq!(item.link_url, format!("{}/2015/03/a1.html?m=1", server.uri()));
    assert_eq!(item.date_strategy, DateStrategy::MetaTag);
    assert_eq!(item.content.as_deref(), Some("Linked copy."));
}

#[tokio::test]
async fn test_re_resolve_improves_weak_dates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/undated/post.html"))
        .and(query_param("m", "1"))
        .respond_with(html(
            r#"<html><head><script type="application/ld+json">
                 {"@type": "BlogPosting", "datePublished": "2014-11-02"}
               </script></head><body></body></html>"#
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");
    let link = Url::parse(&format!("{}/undated/post.html?m=1", server.uri())).unwrap();
    let url = canonicalize_url(link.as_str()).unwrap();
    let hash = {
        let mut storage = SqliteStorage::new(&db).unwrap();
        let item = NewItem {
            canonical_url: url.clone(),
            link_url: link.clone(),
            title: "Undated".to_string(),
            snippet: String::new(),
            content: None,
            resolved: ResolvedDate::unresolved(),
            match_rationale: "all".to_string(),
            first_seen_run: None,
        };
        storage.try_accept(&item).unwrap();
        item.identity_hash()
    };

    let (mut run, _tx) = traversal(create_test_config(&server, &db, Mode::Incremental), vec![]);
    let summary = run.re_resolve().await.expect("Re-resolve failed");
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.improved, 1);

    let item = run.storage().get_item(&hash).unwrap().unwrap();
    assert_eq!(item.canonical_url, url.as_str());
    assert_eq!(item.link_url, link.as_str());
    assert_eq!(item.date_confidence, Confidence::High);
    assert_eq!(item.date_strategy, DateStrategy::StructuredData);
    assert!(!item.needs_review);
}

#[tokio::test]
async fn test_locked_source_fails_fast() {
    let server = MockServer::start().await;
    mount_page_1(&server).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("chronicle.db");

    let config = create_test_config(&server, &db, Mode::Incremental);
    let _held = SourceLock::acquire(&db, &config.source.base_url).unwrap();
    let (mut run, _tx) = traversal(config, vec![]);

    let result = run.run().await;
    assert!(matches!(result, Err(ChronicleError::SourceLocked { .. })));
    assert!(run.storage().recent_runs(10).unwrap().is_empty());
}
