//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the platform's API and article
//! pages, and drive the full crawl cycle end-to-end.

use mp_harvest::checkpoint::{SqliteStore, Store};
use mp_harvest::config::{
    AccountEntry, Config, CrawlerConfig, ExtractionConfig, OutputConfig, SessionConfig,
    WindowConfig,
};
use mp_harvest::crawler::Coordinator;
use mp_harvest::extract::Extractor;
use mp_harvest::state::TargetState;
use mp_harvest::transport::FetchDisposition;
use std::io::Write;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(api_base: &str, db_path: &str, creds_path: &str, fakeid: Option<&str>) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 2,
            max_retries: 3,
            min_request_interval: 100,
            min_host_interval: 100,
            max_host_in_flight: 2,
            backoff_base: 100,
            backoff_cap: 2,
            default_rate_limit_backoff: 1,
            request_timeout: 10,
        },
        session: SessionConfig {
            credentials_path: creds_path.to_string(),
            api_base: api_base.to_string(),
            user_agent: "mp-harvest-test/1.0".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        extraction: ExtractionConfig {
            content_selector: "p".to_string(),
            list_page_size: 2,
        },
        window: WindowConfig::default(),
        accounts: vec![AccountEntry {
            name: "daily-news".to_string(),
            fakeid: fakeid.map(|s| s.to_string()),
        }],
    }
}

/// Writes a credentials file and returns its guard
fn write_credentials() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "token = \"tok123\"\ncookie = \"slave_sid=abc\"").unwrap();
    file.flush().unwrap();
    file
}

fn temp_db_path(name: &str) -> String {
    format!("/tmp/mp_harvest_{}_{}.db", name, std::process::id())
}

fn list_body(entries: &[(&str, &str)]) -> serde_json::Value {
    let list: Vec<serde_json::Value> = entries
        .iter()
        .map(|(title, link)| {
            serde_json::json!({"title": title, "link": link, "update_time": 1_700_000_000})
        })
        .collect();
    serde_json::json!({"base_resp": {"ret": 0}, "app_msg_list": list})
}

fn article_body(title: &str, text: &str) -> String {
    format!(
        r#"<html><head><title>{}</title></head><body>
        <h1 class="rich_media_title" id="activity-name">{}</h1>
        <p>{}</p>
        </body></html>"#,
        title, title, text
    )
}

/// One list fetch yields its records and discoveries; after committing,
/// the checkpoint holds the seed done and the discoveries pending.
#[test]
fn test_single_drain_checkpoint_shape() {
    let db_path = temp_db_path("drain_shape");
    let _ = std::fs::remove_file(&db_path);

    let config = create_test_config(
        "https://mp.weixin.qq.com",
        &db_path,
        "/nonexistent",
        Some("FAKE=="),
    );

    let mut store = SqliteStore::new(std::path::Path::new(&db_path)).unwrap();
    let run_id = store.create_run("hash").unwrap();

    let seed = mp_harvest::state::TargetSeed::new(
        mp_harvest::extract::list_url("https://mp.weixin.qq.com", "FAKE==", 0, 2),
        mp_harvest::state::TargetKind::ArticleList {
            account: "daily-news".to_string(),
            fakeid: "FAKE==".to_string(),
            page: 0,
        },
    );
    let target = store.insert_seed(&seed, run_id).unwrap().unwrap();

    // A full page: 2 records, 2 article targets plus the next list page
    let body = list_body(&[
        ("First", "https://mp.weixin.qq.com/s/aaa"),
        ("Second", "https://mp.weixin.qq.com/s/bbb"),
    ])
    .to_string();

    let fetch = mp_harvest::transport::FetchResult {
        url: target.url.clone(),
        status: Some(200),
        body,
        fetched_at: chrono::Utc::now(),
        elapsed: std::time::Duration::from_millis(5),
        disposition: FetchDisposition::Success,
    };

    let extraction = Extractor::for_kind(&config, &target.kind)
        .extract(&fetch)
        .unwrap();
    assert_eq!(extraction.records.len(), 2);
    assert_eq!(extraction.discovered.len(), 3);

    let batch = mp_harvest::checkpoint::CommitBatch {
        transitions: vec![mp_harvest::checkpoint::Transition {
            target_id: target.id,
            state: TargetState::Done,
            retry_count: 0,
            error: None,
        }],
        records: extraction.records,
        discovered: extraction.discovered,
    };
    store.commit(run_id, target.id, batch).unwrap();

    // 4 targets: 1 done, 3 pending; 2 records
    assert_eq!(store.count_targets().unwrap(), 4);
    assert_eq!(store.count_targets_by_state(TargetState::Done).unwrap(), 1);
    assert_eq!(
        store.count_targets_by_state(TargetState::Pending).unwrap(),
        3
    );
    assert_eq!(store.count_records().unwrap(), 2);

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_full_crawl_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // List page 0: full page of 2, discovers two articles and page 1
    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("begin", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[
            ("First", &format!("{}/s/aaa", base_url)),
            ("Second", &format!("{}/s/bbb", base_url)),
        ])))
        .mount(&mock_server)
        .await;

    // List page 1: empty, pagination stops
    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("begin", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s/aaa"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(article_body("First", "Alpha text.")),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s/bbb"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(article_body("Second", "Beta text.")),
        )
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("full_crawl");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );

    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    // list page 0 + 2 articles + list page 1
    assert_eq!(summary.targets_total, 4);
    assert_eq!(summary.done, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pending, 0);

    // 2 listing stubs + 2 article-content records
    assert_eq!(summary.records, 4);
    assert_eq!(summary.records_with_body, 2);

    let _ = std::fs::remove_file(&db_path);
}

/// HTTP 429 with a Retry-After hint defers the target; the run still
/// completes once the hint elapses, and not before.
#[tokio::test]
async fn test_rate_limit_hint_delays_retry() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_string("slow down"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[])))
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("rate_limit");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );

    let started = std::time::Instant::now();
    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 0);
    // The deferred target was not re-offered before the 1s hint elapsed
    assert!(
        started.elapsed() >= std::time::Duration::from_secs(1),
        "retry happened before the Retry-After hint elapsed"
    );

    let _ = std::fs::remove_file(&db_path);
}

/// A target failing past the retry cap terminates in failed, never loops.
#[tokio::test]
async fn test_retry_cap_terminates_in_failed() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2) // initial attempt + max_retries
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("retry_cap");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let mut config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );
    config.crawler.max_retries = 1;
    config.crawler.backoff_base = 50;
    config.crawler.backoff_cap = 1;

    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    assert_eq!(summary.done, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pending, 0);

    let _ = std::fs::remove_file(&db_path);
}

/// A completed crawl resumes without re-fetching done targets.
#[tokio::test]
async fn test_resume_does_not_refetch_done_targets() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Exactly one fetch across both runs
    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("resume");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );

    let coordinator =
        Coordinator::new(config.clone(), "test-hash", true).expect("create coordinator");
    let first = coordinator.run().await.expect("first crawl failed");
    assert_eq!(first.done, 1);

    // Second run over the same checkpoint: nothing to fetch
    let coordinator = Coordinator::new(config, "test-hash", false).expect("create coordinator");
    let second = coordinator.run().await.expect("second crawl failed");
    assert_eq!(second.done, 1);
    assert_eq!(second.pending, 0);

    let _ = std::fs::remove_file(&db_path);
}

/// An auth-expiry response refreshes credentials and retries the fetch
/// once, transparently to the scheduler.
#[tokio::test]
async fn test_auth_expiry_refresh_and_retry() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // First response: platform says the session is invalid
    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"base_resp": {"ret": -6}})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    // Retry after refresh succeeds
    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("auth_refresh");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );

    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 0);

    let _ = std::fs::remove_file(&db_path);
}

/// Accounts without a configured fakeid are resolved through the search
/// endpoint before their list pages are crawled.
#[tokio::test]
async fn test_account_resolved_by_search() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "base_resp": {"ret": 0},
            "list": [{"fakeid": "RESOLVED==", "nickname": "daily-news"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("fakeid", "RESOLVED=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("search");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let config = create_test_config(&base_url, &db_path, creds.path().to_str().unwrap(), None);

    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    // Search target + resolved list page, both done
    assert_eq!(summary.targets_total, 2);
    assert_eq!(summary.done, 2);

    let _ = std::fs::remove_file(&db_path);
}

/// Malformed documents fail extraction without crashing the run; the
/// target retries and then goes terminal.
#[tokio::test]
async fn test_malformed_document_retries_then_fails() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<<<not json>>>"))
        .mount(&mock_server)
        .await;

    let db_path = temp_db_path("malformed");
    let _ = std::fs::remove_file(&db_path);
    let creds = write_credentials();
    let mut config = create_test_config(
        &base_url,
        &db_path,
        creds.path().to_str().unwrap(),
        Some("FAKE=="),
    );
    config.crawler.max_retries = 1;
    config.crawler.backoff_base = 50;
    config.crawler.backoff_cap = 1;

    let coordinator = Coordinator::new(config, "test-hash", true).expect("create coordinator");
    let summary = coordinator.run().await.expect("crawl failed");

    assert_eq!(summary.done, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.records, 0);

    let _ = std::fs::remove_file(&db_path);
}
