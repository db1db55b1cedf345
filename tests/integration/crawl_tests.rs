//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the racing site and run full
//! crawl sessions end-to-end against a SQLite database in a temp directory.

use furlong::config::{load_config_with_hash, Config};
use furlong::crawler::{start_crawl, CrawlEvent, CrawlOptions, HttpSource};
use furlong::storage::{open_storage, SqliteStorage, StopReason, Storage};
use furlong::{UrlKind, UrlStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = "/racing/results/2024-03-02";
const RACE_1: &str = "/racing/results/2024-03-02/kempton/812341/novice-hurdle";
const RACE_2: &str = "/racing/results/2024-03-02/kempton/812342/handicap-chase";
const RACE_3: &str = "/racing/results/2024-03-02/kempton/812343/bumper";
const HORSE: &str = "/racing/profiles/horse/556677";

/// Writes a config pointing at the mock server and loads it
fn load_test_config(dir: &TempDir, server: &MockServer, quota: u32) -> (Config, String) {
    let db_path = dir.path().join("racing_data.db");
    let config_path = dir.path().join("furlong.toml");
    let content = format!(
        r#"
[crawler]
quota = {quota}
timeout-mins = 5
min-delay-ms = 0
max-delay-ms = 0
fetch-timeout-secs = 5

[site]
seed = "{base}{listing}"
allowed-domains = ["127.0.0.1"]
follow-prefixes = ["/racing/"]

[user-agent]
crawler-name = "furlong-test"
crawler-version = "0.1.0"
contact-url = "https://example.com/about"
contact-email = "test@example.com"

[output]
database-path = "{db}"
"#,
        quota = quota,
        base = server.uri(),
        listing = LISTING,
        db = db_path.display()
    );
    std::fs::write(&config_path, content).expect("Failed to write config");

    load_config_with_hash(&config_path).expect("Failed to load config")
}

fn html(links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    let body = format!(
        "<html><head><title>Results</title></head><body>{}</body></html>",
        anchors
    );
    // set_body_string would force text/plain
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, route: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(times)
        .named(route)
        .mount(server)
        .await;
}

fn address(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

fn database(config: &Config) -> PathBuf {
    PathBuf::from(&config.output.database_path)
}

fn source(config: &Config) -> HttpSource {
    HttpSource::new(&config.user_agent, Duration::from_secs(5)).expect("Failed to build client")
}

fn options(config: &Config, hash: String, resume: bool) -> CrawlOptions {
    let mut options = CrawlOptions::from_config(config);
    options.config_hash = hash;
    options.resume = resume;
    options
}

fn reopen(path: &Path) -> SqliteStorage {
    open_storage(path).expect("Failed to reopen database")
}

#[tokio::test]
async fn test_listing_discovers_races_and_skips_finished_participant() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&dir, &server, 100);

    mount_page(&server, LISTING, html(&[RACE_1, RACE_2, HORSE]), 1).await;
    mount_page(&server, RACE_1, html(&[]), 1).await;
    mount_page(&server, RACE_2, html(&[]), 1).await;
    // Already scraped, so never fetched
    mount_page(&server, HORSE, html(&[]), 0).await;

    {
        let mut storage = reopen(&database(&config));
        let horse = address(&server, HORSE);
        storage
            .upsert(&horse, UrlKind::Horse, UrlStatus::InProgress)
            .unwrap();
        storage.mark_status(&horse, UrlStatus::Succeeded).unwrap();
    }

    let storage = reopen(&database(&config));
    let mut handle = start_crawl(storage, source(&config), options(&config, hash.clone(), false))
        .expect("Failed to start crawl");

    let mut last_progress = None;
    let mut log_lines = 0;
    while let Some(event) = handle.next_event().await {
        match event {
            CrawlEvent::Progress { discovered, .. } => last_progress = Some(discovered),
            CrawlEvent::Log(_) => log_lines += 1,
        }
    }
    let report = handle.wait().await.expect("Crawl task failed");

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.failures, 0);
    assert_eq!(last_progress, Some(2));
    assert!(log_lines > 0);

    let storage = reopen(&database(&config));
    for route in [RACE_1, RACE_2] {
        let record = storage
            .get_record(&address(&server, route))
            .unwrap()
            .expect("race should be stored");
        assert_eq!(record.kind, UrlKind::Race);
        assert_eq!(record.status, UrlStatus::Unprocessed);
        assert!(record.last_accessed.is_some());
    }
    assert_eq!(
        storage.status_of(&address(&server, HORSE)).unwrap(),
        Some(UrlStatus::Succeeded)
    );

    let session = storage.get_session(report.session_id).unwrap();
    assert_eq!(session.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(session.discovered_count, 2);
    assert_eq!(session.config_hash, hash);
    assert!(!session.resumed);
    assert!(storage.load_latest_snapshot().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_fetches_are_recorded_and_crawl_continues() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&dir, &server, 100);

    mount_page(
        &server,
        LISTING,
        html(&[RACE_1, "/racing/cards/today.pdf", RACE_2, "mailto:x@example.com"]),
        1,
    )
    .await;
    mount_page(&server, RACE_1, ResponseTemplate::new(500), 1).await;
    mount_page(
        &server,
        "/racing/cards/today.pdf",
        ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        1,
    )
    .await;
    mount_page(&server, RACE_2, html(&[]), 1).await;

    let storage = reopen(&database(&config));
    let handle = start_crawl(storage, source(&config), options(&config, hash, false))
        .expect("Failed to start crawl");
    let report = handle.wait().await.expect("Crawl task failed");

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.failures, 1);
    assert_eq!(report.discovered, 1);

    let storage = reopen(&database(&config));
    assert_eq!(
        storage.status_of(&address(&server, RACE_1)).unwrap(),
        Some(UrlStatus::Failed)
    );
    assert_eq!(
        storage.status_of(&address(&server, RACE_2)).unwrap(),
        Some(UrlStatus::Unprocessed)
    );

    // Non-HTML pages are visited but never failed
    let pdf = storage
        .get_record(&address(&server, "/racing/cards/today.pdf"))
        .unwrap()
        .expect("visited page should be stamped");
    assert_eq!(pdf.status, UrlStatus::Unprocessed);
    assert!(pdf.last_accessed.is_some());
}

#[tokio::test]
async fn test_resume_picks_up_where_quota_stopped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Every page exactly once across both sessions
    mount_page(&server, LISTING, html(&[RACE_1, RACE_2, RACE_3]), 1).await;
    mount_page(&server, RACE_1, html(&[HORSE, LISTING]), 1).await;
    mount_page(&server, RACE_2, html(&[RACE_1]), 1).await;
    mount_page(&server, RACE_3, html(&[HORSE]), 1).await;
    mount_page(&server, HORSE, html(&[RACE_1]), 1).await;

    let (config, hash) = load_test_config(&dir, &server, 1);
    let storage = reopen(&database(&config));
    let first = start_crawl(storage, source(&config), options(&config, hash, false))
        .expect("Failed to start first session")
        .wait()
        .await
        .expect("First session failed");

    assert_eq!(first.stop_reason, StopReason::QuotaReached);
    assert_eq!(first.discovered, 1);
    assert!(first.queue_depth > 0);

    let (config, hash) = load_test_config(&dir, &server, 100);
    let storage = reopen(&database(&config));
    let second = start_crawl(storage, source(&config), options(&config, hash, true))
        .expect("Failed to start second session")
        .wait()
        .await
        .expect("Second session failed");

    assert_eq!(second.stop_reason, StopReason::Exhausted);
    assert!(second.resumed);
    assert_eq!(first.discovered + second.discovered, 4);

    let storage = reopen(&database(&config));
    let sessions = storage.list_sessions(10).unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].resumed);
    assert_eq!(sessions[1].stop_reason, Some(StopReason::QuotaReached));
}

#[tokio::test]
async fn test_cancel_before_first_step() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&dir, &server, 100);

    mount_page(&server, LISTING, html(&[RACE_1]), 0).await;

    let storage = reopen(&database(&config));
    let handle = start_crawl(storage, source(&config), options(&config, hash, false))
        .expect("Failed to start crawl");
    handle.cancel();
    let report = handle.wait().await.expect("Crawl task failed");

    assert_eq!(report.stop_reason, StopReason::UserCancelled);
    assert_eq!(report.pages_visited, 0);

    // The seed is kept for the next session
    let storage = reopen(&database(&config));
    assert_eq!(
        storage.load_latest_snapshot().unwrap(),
        vec![address(&server, LISTING)]
    );
}

#[tokio::test]
async fn test_http_source_reads_html_pages() {
    use furlong::crawler::{FetchResult, PageSource};

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (config, _) = load_test_config(&dir, &server, 100);
    mount_page(&server, LISTING, html(&[RACE_1]), 1).await;

    let url = url::Url::parse(&address(&server, LISTING)).unwrap();
    match source(&config).fetch(&url).await {
        FetchResult::Success {
            content_type, body, ..
        } => {
            assert!(content_type.starts_with("text/html"));
            assert!(body.contains(RACE_1));
        }
        other => panic!("expected an HTML page, got {:?}", other),
    }
}
