//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use sense_crawler::config::{
    Config, CrawlerConfig, OutputConfig, RateLimitConfig, RetryConfig, SelectorConfig,
    UserAgentConfig,
};
use sense_crawler::crawler::{build_http_client, Coordinator, FetchError, Fetcher};
use sense_crawler::state::ItemState;
use sense_crawler::storage::{Checkpoint, RunStatus, SqliteStorage, Storage};
use sense_crawler::{RateLimiter, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short retry delays and a generous limiter
fn create_test_config(server: &MockServer, dir: &TempDir, max_pages: u32) -> Config {
    Config {
        crawler: CrawlerConfig {
            listing_url: format!("{}/fonts?page={{page}}", server.uri()),
            start_page: 1,
            max_pages,
            progress_every: 2,
        },
        rate_limit: RateLimitConfig {
            max_tokens: 50.0,
            refill_per_second: 100.0,
        },
        retry: RetryConfig {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 40,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.path().join("fonts.db").display().to_string(),
            summary_path: dir.path().join("summary.md").display().to_string(),
        },
        selectors: SelectorConfig::default(),
    }
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

fn listing_html(font_paths: &[&str], has_next: bool) -> String {
    let links: String = font_paths
        .iter()
        .map(|p| format!(r#"<a class="font-card" href="{}">font</a>"#, p))
        .collect();
    let next = if has_next {
        r#"<a rel="next" href="?page=next">Next</a>"#
    } else {
        ""
    };
    format!("<html><body>{}{}</body></html>", links, next)
}

fn font_html(name: &str, license: &str) -> String {
    format!(
        r#"<html><head><title>{name} | Fonts</title></head><body>
            <h1 class="font-name">{name}</h1>
            <p class="font-foundry">Sandoll</p>
            <div class="font-license">{license}</div>
            <span class="font-tag">sans-serif</span>
        </body></html>"#
    )
}

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/fonts"))
        .and(query_param("page", page.to_string()))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_font(server: &MockServer, font_path: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(font_path))
        .respond_with(html(font_html(name, "SIL Open Font License 1.1")))
        .mount(server)
        .await;
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).expect("Failed to open database")
}

#[tokio::test]
async fn test_full_crawl_walks_listing_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing(&server, 1, listing_html(&["/font/1", "/font/2"], true)).await;
    mount_listing(&server, 2, listing_html(&["/font/3"], false)).await;
    mount_font(&server, "/font/1", "Nanum Gothic").await;
    mount_font(&server, "/font/2", "Noto Sans KR").await;
    mount_font(&server, "/font/3", "Pretendard").await;

    let config = create_test_config(&server, &dir, 10);
    let mut coordinator =
        Coordinator::new(config.clone(), "hash", true).expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert!(!report.interrupted);
    assert_eq!(report.pages_walked, 2);
    assert_eq!(report.items_stored, 3);
    assert_eq!(report.items_failed, 0);

    let storage = open_db(&config);
    assert_eq!(storage.count_fonts().unwrap(), 3);

    let font = storage
        .get_font_by_url(&format!("{}/font/3", server.uri()))
        .unwrap()
        .expect("Font 3 should be stored");
    assert_eq!(font.name, "Pretendard");
    assert_eq!(font.foundry.as_deref(), Some("Sandoll"));
    assert_eq!(font.license.as_deref(), Some("SIL Open Font License 1.1"));
    assert_eq!(font.tags, vec!["sans-serif"]);

    let run = storage.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash");
    assert_eq!(
        storage.load_checkpoint(report.run_id).unwrap(),
        Some(Checkpoint {
            next_page: 3,
            items_stored: 3
        })
    );
}

#[tokio::test]
async fn test_crawl_stops_at_max_pages_and_empty_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing(&server, 1, listing_html(&["/font/1"], true)).await;
    mount_font(&server, "/font/1", "Nanum Myeongjo").await;
    Mock::given(method("GET"))
        .and(path("/fonts"))
        .and(query_param("page", "2"))
        .respond_with(html(listing_html(&[], true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fonts"))
        .and(query_param("page", "3"))
        .respond_with(html(listing_html(&["/font/9"], false)))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir, 5);
    let mut coordinator = Coordinator::new(config, "hash", true).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.pages_walked, 2);
    assert_eq!(report.items_stored, 1);
}

#[tokio::test]
async fn test_duplicate_links_fetched_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing(
        &server,
        1,
        listing_html(&["/font/1", "/font/1/?utm_source=list", "/font/1#specimen"], false),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(html(font_html("Gmarket Sans", "Free")))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir, 1);
    let mut coordinator = Coordinator::new(config.clone(), "hash", true).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.items_stored, 1);
    assert_eq!(open_db(&config).count_fonts().unwrap(), 1);
}

#[tokio::test]
async fn test_rate_limited_then_success_resets_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(html(font_html("Spoqa Han Sans", "OFL")))
        .mount(&server)
        .await;

    let user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    let limiter = Arc::new(RateLimiter::new(10.0, 100.0));
    let fetcher = Fetcher::new(
        build_http_client(&user_agent).unwrap(),
        Arc::clone(&limiter),
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
    );

    let page = fetcher
        .fetch_page(&format!("{}/font/1", server.uri()))
        .await
        .expect("Second attempt should succeed");

    assert_eq!(page.status_code, 200);
    assert!(page.body.contains("Spoqa Han Sans"));

    let stats = limiter.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.rate_limit_hits, 1);
    assert_eq!(limiter.backoff_multiplier(), 1.0);
}

#[tokio::test]
async fn test_persistent_rate_limit_keeps_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 1);
    let fetcher = Fetcher::from_config(&config).unwrap();

    let result = fetcher
        .fetch_page(&format!("{}/font/1", server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::RateLimited { .. })));
    assert_eq!(fetcher.limiter().stats().rate_limit_hits, 3);
    assert_eq!(fetcher.limiter().backoff_multiplier(), 8.0);
}

#[tokio::test]
async fn test_timeout_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(html(font_html("Gmarket Sans", "OFL")).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let limiter = Arc::new(RateLimiter::new(10.0, 100.0));
    let fetcher = Fetcher::new(
        client,
        Arc::clone(&limiter),
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
    );

    let result = fetcher
        .fetch_page(&format!("{}/font/1", server.uri()))
        .await;

    let err = result.expect_err("Slow response should time out");
    assert!(matches!(err, FetchError::Timeout { .. }));
    assert_eq!(ItemState::from_fetch_error(&err), ItemState::Unreachable);
    assert_eq!(limiter.stats().acquired, 1);
}

#[tokio::test]
async fn test_item_failures_recorded_and_batch_continues() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing(
        &server,
        1,
        listing_html(&["/font/broken", "/font/gone", "/font/blank", "/font/ok"], false),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/font/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/font/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/font/blank"))
        .respond_with(html("<html><body><p>coming soon</p></body></html>"))
        .mount(&server)
        .await;
    mount_font(&server, "/font/ok", "Jalnan").await;

    let config = create_test_config(&server, &dir, 1);
    let mut coordinator = Coordinator::new(config.clone(), "hash", true).unwrap();
    let report = coordinator.run().await.expect("Item failures should not fail the run");

    assert_eq!(report.items_stored, 1);
    assert_eq!(report.items_failed, 3);

    let storage = open_db(&config);
    let run_id = report.run_id;
    let item = |p: &str| {
        storage
            .get_item_state(run_id, &format!("{}{}", server.uri(), p))
            .unwrap()
    };
    assert_eq!(item("/font/broken"), Some(ItemState::Failed));
    assert_eq!(item("/font/gone"), Some(ItemState::NotFound));
    assert_eq!(item("/font/blank"), Some(ItemState::ParseFailed));
    assert_eq!(item("/font/ok"), Some(ItemState::Stored));

    let failures = storage.get_failures(run_id).unwrap();
    assert_eq!(failures.len(), 3);
    let broken = failures
        .iter()
        .find(|f| f.url.ends_with("/font/broken"))
        .unwrap();
    assert_eq!(broken.status_code, Some(500));
    assert_eq!(broken.attempts, 1);

    assert_eq!(
        storage.get_run(run_id).unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_listing_failure_fails_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/fonts"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir, 3);
    let mut coordinator = Coordinator::new(config.clone(), "hash", true).unwrap();
    let run_id = coordinator.run_id();

    let result = coordinator.run().await;
    assert!(result.is_err());

    let storage = open_db(&config);
    assert_eq!(storage.get_run(run_id).unwrap().status, RunStatus::Failed);
    assert_eq!(storage.load_checkpoint(run_id).unwrap(), None);
}

#[tokio::test]
async fn test_resume_continues_from_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 5);

    let interrupted_run = {
        let mut storage = open_db(&config);
        let run_id = storage.create_run("hash").unwrap();
        storage
            .save_checkpoint(
                run_id,
                Checkpoint {
                    next_page: 2,
                    items_stored: 1,
                },
            )
            .unwrap();
        storage
            .update_run_status(run_id, RunStatus::Interrupted)
            .unwrap();

        // /font/1 is covered by the checkpoint; /font/2 was stored after it
        // and must be counted without being fetched again
        for font_path in ["/font/1", "/font/2"] {
            let url = format!("{}{}", server.uri(), font_path);
            storage
                .record_item_state(run_id, &url, ItemState::Fetching, None, None)
                .unwrap();
            storage
                .record_item_state(run_id, &url, ItemState::Stored, Some(200), None)
                .unwrap();
        }
        run_id
    };

    Mock::given(method("GET"))
        .and(path("/fonts"))
        .and(query_param("page", "1"))
        .respond_with(html(listing_html(&["/font/1"], true)))
        .expect(0)
        .mount(&server)
        .await;
    mount_listing(&server, 2, listing_html(&["/font/2", "/font/3"], false)).await;
    Mock::given(method("GET"))
        .and(path("/font/2"))
        .respond_with(html(font_html("Already Stored", "OFL")))
        .expect(0)
        .mount(&server)
        .await;
    mount_font(&server, "/font/3", "Cafe24 Ssurround").await;

    let mut coordinator = Coordinator::new(config.clone(), "hash", false).unwrap();
    assert_eq!(coordinator.run_id(), interrupted_run);

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.run_id, interrupted_run);
    assert_eq!(report.pages_walked, 1);
    assert_eq!(report.items_stored, 3);

    let storage = open_db(&config);
    assert_eq!(
        storage.get_run(interrupted_run).unwrap().status,
        RunStatus::Completed
    );
    assert_eq!(
        storage.load_checkpoint(interrupted_run).unwrap(),
        Some(Checkpoint {
            next_page: 3,
            items_stored: 3
        })
    );
}

#[tokio::test]
async fn test_resume_counts_items_stored_mid_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 1);

    mount_listing(&server, 1, listing_html(&["/font/1", "/font/2"], false)).await;
    Mock::given(method("GET"))
        .and(path("/font/1"))
        .respond_with(html(font_html("Nanum Gothic", "OFL")))
        .expect(1)
        .mount(&server)
        .await;
    // Slow on the first request so the crawl is cancelled while waiting for it
    Mock::given(method("GET"))
        .and(path("/font/2"))
        .respond_with(html(font_html("Noto Sans KR", "OFL")).set_delay(Duration::from_secs(5)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_font(&server, "/font/2", "Noto Sans KR").await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let mut first = Coordinator::new(config.clone(), "hash", true).unwrap();
    let run_id = first.run_id();
    let report = first.run_until_cancelled(&cancel).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.items_stored, 1);
    drop(first);

    // No listing page finished, so there is no checkpoint yet
    assert_eq!(open_db(&config).load_checkpoint(run_id).unwrap(), None);

    let mut second = Coordinator::new(config.clone(), "hash", false).unwrap();
    assert_eq!(second.run_id(), run_id);
    let report = second.run().await.unwrap();
    assert!(!report.interrupted);
    assert_eq!(report.items_stored, 2);

    let storage = open_db(&config);
    assert_eq!(
        storage
            .count_items_by_state(run_id, ItemState::Stored)
            .unwrap(),
        2
    );
    assert_eq!(
        storage.load_checkpoint(run_id).unwrap(),
        Some(Checkpoint {
            next_page: 2,
            items_stored: 2
        })
    );
}
