//! Integration tests for the harvester
//!
//! The queue scenarios drive `CrawlOrchestrator` with scripted in-process
//! transports. The end-to-end tests use wiremock to serve entry and index
//! pages and run the full `run_crawl` cycle against an on-disk database.

use async_trait::async_trait;
use lexicon_harvester::config::{
    Config, CrawlerConfig, OutputConfig, ParserConfig, SeedConfig, TransportConfig,
    UserAgentConfig,
};
use lexicon_harvester::crawler::{
    build_http_client, run_crawl, CrawlOptions, CrawlOrchestrator, EntryPageParser, FetchWorker,
    HttpTransport, RateLimiter, Transport, TransportError,
};
use lexicon_harvester::output::export_to_path;
use lexicon_harvester::state::ItemStatus;
use lexicon_harvester::storage::{
    ProgressSnapshot, ResultRecord, ResultStore, RunStatus, SqliteStorage, WorkQueue,
};
use lexicon_harvester::HarvestError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn entry_page(headword: &str, gloss: &str) -> String {
    format!(
        r#"<html><head><title>{0}</title></head><body>
        <div class="text"><a name="{0}">{0}</a>, {1}</div>
        </body></html>"#,
        headword, gloss
    )
}

/// Fails the first `failures` fetches of each key, then serves an entry page
struct ScriptedTransport {
    failures: u32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransport {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    fn attempts(&self, key: &str) -> u32 {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, key: &str) -> Result<String, TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt <= self.failures {
            Err(TransportError::Timeout(format!("attempt {} for {}", attempt, key)))
        } else {
            Ok(entry_page(key, "a test entry"))
        }
    }
}

fn orchestrator(storage: &Arc<SqliteStorage>, transport: Arc<ScriptedTransport>) -> CrawlOrchestrator {
    let parser = EntryPageParser::new(&ParserConfig::default()).unwrap();
    let worker = FetchWorker::new(
        transport,
        Arc::new(parser),
        storage.clone(),
        storage.clone(),
        Arc::new(RateLimiter::new(Duration::from_millis(1))),
    );
    CrawlOrchestrator::new(worker)
}

/// Creates a test configuration seeded with the given keys
fn create_test_config(db_path: &Path, keys: Vec<String>) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency: 2,
            request_delay_ms: 5, // Very short for testing
            max_retries: 2,
            stale_claim_secs: 600,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        transport: TransportConfig {
            url_template: None,
            timeout_secs: 5,
        },
        parser: ParserConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
            export_path: db_path.with_extension("json").to_string_lossy().into_owned(),
        },
        seed: SeedConfig {
            keys,
            ..SeedConfig::default()
        },
    }
}

async fn mount_entry(server: &MockServer, doc: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/hopper/text"))
        .and(query_param("doc", doc))
        .respond_with(response)
        .mount(server)
        .await;
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

// ===== Queue scenarios =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_always_failing_transport_exhausts_retries() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    for key in ["α", "β", "γ", "δ", "ε"] {
        storage.enqueue(key).unwrap();
    }
    let transport = Arc::new(ScriptedTransport::always_failing());

    let summary = orchestrator(&storage, transport.clone())
        .run(2)
        .await
        .unwrap();

    assert_eq!(
        storage.progress_snapshot().unwrap(),
        ProgressSnapshot {
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 5,
        }
    );
    assert_eq!(summary.attempted, 15);
    assert_eq!(summary.succeeded, 0);

    for item in storage.items_by_status(ItemStatus::Failed).unwrap() {
        assert_eq!(item.retry_count, 3);
        assert_eq!(transport.attempts(&item.key), 3);
        assert!(item.error.unwrap().contains("timed out"));
        assert!(item.processing_started.is_none());
    }
    assert_eq!(storage.count_results().unwrap(), 0);
}

#[tokio::test]
async fn test_flaky_key_completes_on_third_attempt() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage.enqueue("X").unwrap();
    let transport = Arc::new(ScriptedTransport::new(2));

    let summary = orchestrator(&storage, transport.clone())
        .run(2)
        .await
        .unwrap();

    let item = storage.get_item("X").unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.retry_count, 2);
    assert!(item.error.is_none());
    assert_eq!(transport.attempts("X"), 3);
    assert_eq!(summary.batches, 3);

    assert_eq!(storage.count_results().unwrap(), 1);
    let record = storage.get_result("X").unwrap().unwrap();
    assert_eq!(record.source_tag, "LSJ");
    assert_eq!(record.payload["headwords"][0], "X");
}

#[tokio::test]
async fn test_reset_failed_gives_a_fresh_budget() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    for key in ["a", "b", "c"] {
        storage.enqueue(key).unwrap();
    }
    orchestrator(&storage, Arc::new(ScriptedTransport::always_failing()))
        .run(3)
        .await
        .unwrap();
    assert_eq!(storage.progress_snapshot().unwrap().failed, 3);

    // Exhausted items are not picked up again without a reset
    let idle = orchestrator(&storage, Arc::new(ScriptedTransport::new(0)))
        .run(3)
        .await
        .unwrap();
    assert_eq!(idle.attempted, 0);

    assert_eq!(storage.reset_failed().unwrap(), 3);
    for item in storage.items_by_status(ItemStatus::Pending).unwrap() {
        assert_eq!(item.retry_count, 0);
        assert!(item.error.is_none());
    }

    let rerun = orchestrator(&storage, Arc::new(ScriptedTransport::new(0)))
        .run(3)
        .await
        .unwrap();
    assert_eq!(rerun.succeeded, 3);
    assert_eq!(storage.progress_snapshot().unwrap().completed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_spans_all_workers() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    for i in 0..6 {
        storage.enqueue(&format!("k{}", i)).unwrap();
    }
    let parser = EntryPageParser::new(&ParserConfig::default()).unwrap();
    let worker = FetchWorker::new(
        Arc::new(ScriptedTransport::new(0)),
        Arc::new(parser),
        storage.clone(),
        storage.clone(),
        Arc::new(RateLimiter::new(Duration::from_millis(40))),
    );

    let start = std::time::Instant::now();
    let summary = CrawlOrchestrator::new(worker).run(3).await.unwrap();

    assert_eq!(summary.succeeded, 6);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

// ===== HTTP transport =====

#[tokio::test]
async fn test_http_transport_classifies_responses() {
    let server = MockServer::start().await;
    mount_entry(&server, "ok", html(entry_page("ok", "fine"))).await;
    mount_entry(&server, "missing", ResponseTemplate::new(404)).await;
    mount_entry(
        &server,
        "slow",
        ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
    )
    .await;

    let user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    let client = build_http_client(&user_agent, Duration::from_secs(1)).unwrap();
    let transport = HttpTransport::new(client, None);
    let url = |doc: &str| format!("{}/hopper/text?doc={}", server.uri(), doc);

    let body = transport.fetch(&url("ok")).await.unwrap();
    assert!(body.contains("fine"));

    assert!(matches!(
        transport.fetch(&url("missing")).await,
        Err(TransportError::Status { status: 404, .. })
    ));
    assert!(matches!(
        transport.fetch(&url("slow")).await,
        Err(TransportError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_http_transport_sends_user_agent_and_template_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("q", "λόγος"))
        .and(wiremock::matchers::header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html(entry_page("λόγος", "word")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir.path().join("h.sqlite"), vec![]);
    config.transport.url_template = Some(format!("{}/lookup?q={{key}}", server.uri()));

    let transport = HttpTransport::from_config(&config).unwrap();
    let body = transport.fetch("λόγος").await.unwrap();
    assert!(body.contains("word"));
}

// ===== End to end =====

#[tokio::test]
async fn test_full_crawl_against_mock_server() {
    let server = MockServer::start().await;
    mount_entry(&server, "good", html(entry_page("ἀγαθός", "good"))).await;
    mount_entry(&server, "broken", ResponseTemplate::new(500)).await;
    mount_entry(&server, "blank", html("<html><body></body></html>".to_string())).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.sqlite");
    let keys = ["good", "broken", "blank"]
        .iter()
        .map(|doc| format!("{}/hopper/text?doc={}", server.uri(), doc))
        .collect();
    let config = create_test_config(&db_path, keys);

    let summary = run_crawl(&config, "hash-1", CrawlOptions::default(), None)
        .await
        .unwrap();

    assert!(!summary.interrupted);
    assert_eq!(summary.snapshot.completed, 1);
    assert_eq!(summary.snapshot.failed, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let broken = storage
        .get_item(&format!("{}/hopper/text?doc=broken", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(broken.status, ItemStatus::Failed);
    assert_eq!(broken.retry_count, 2);
    assert!(broken.error.unwrap().contains("HTTP 500"));

    let blank = storage
        .get_item(&format!("{}/hopper/text?doc=blank", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(blank.error.as_deref(), Some("no content extracted"));

    let record = storage.get_result("good").unwrap().unwrap();
    assert_eq!(record.payload["headwords"][0], "ἀγαθός");

    let run = storage.latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash-1");

    let export_path = Path::new(&config.output.export_path);
    assert_eq!(export_to_path(&storage, export_path).unwrap(), 1);
    let exported: Vec<ResultRecord> =
        serde_json::from_str(&std::fs::read_to_string(export_path).unwrap()).unwrap();
    assert_eq!(exported[0].key, "good");
}

#[tokio::test]
async fn test_resume_does_not_refetch_completed_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hopper/text"))
        .and(query_param("doc", "once"))
        .respond_with(html(entry_page("once", "fetched a single time")))
        .expect(1)
        .mount(&server)
        .await;
    mount_entry(&server, "later", html(entry_page("later", "added on reseed"))).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("resume.sqlite");
    let once = format!("{}/hopper/text?doc=once", server.uri());
    let later = format!("{}/hopper/text?doc=later", server.uri());

    let first = create_test_config(&db_path, vec![once.clone()]);
    run_crawl(&first, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();

    // Without --reseed a non-empty queue is not seeded again
    let second = create_test_config(&db_path, vec![once.clone(), later.clone()]);
    let summary = run_crawl(&second, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.attempted, 0);

    let summary = run_crawl(&second, "hash", CrawlOptions { reseed: true }, None)
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.snapshot.completed, 2);
}

#[tokio::test]
async fn test_restart_sweeps_claims_of_dead_run() {
    let server = MockServer::start().await;
    mount_entry(&server, "orphan", html(entry_page("orphan", "recovered"))).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crash.sqlite");
    let key = format!("{}/hopper/text?doc=orphan", server.uri());

    // A previous process claimed the item and died without finishing its run
    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        storage.create_run("hash").unwrap();
        storage.enqueue(&key).unwrap();
        storage.claim_next().unwrap().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let mut config = create_test_config(&db_path, vec![]);
    config.crawler.stale_claim_secs = 1;
    let summary = run_crawl(&config, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let item = storage.get_item(&key).unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.retry_count, 1);
    assert_eq!(storage.latest_run().unwrap().unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_young_orphaned_claim_is_swept_on_a_later_start() {
    let server = MockServer::start().await;
    mount_entry(&server, "young", html(entry_page("young", "eventually fetched"))).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("quick-restart.sqlite");
    let key = format!("{}/hopper/text?doc=young", server.uri());

    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        storage.create_run("hash").unwrap();
        storage.enqueue(&key).unwrap();
        storage.claim_next().unwrap().unwrap();
    }

    let mut config = create_test_config(&db_path, vec![]);
    config.crawler.stale_claim_secs = 2;

    // Restarted right away: the claim is too young to sweep
    let summary = run_crawl(&config, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.snapshot.processing, 1);

    // The dead run is closed out, so the next start no longer sees it as running
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.latest_run().unwrap().unwrap().status, RunStatus::Completed);
    drop(storage);

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let summary = run_crawl(&config, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.snapshot.processing, 0);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let item = storage.get_item(&key).unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.retry_count, 1);
}

#[tokio::test]
async fn test_setup_failure_records_no_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("bad-setup.sqlite");
    let mut config = create_test_config(&db_path, vec!["https://example.com/a".to_string()]);
    config.parser.content_selector = "div[".to_string();

    let result = run_crawl(&config, "hash", CrawlOptions::default(), None).await;
    assert!(matches!(result, Err(HarvestError::Parse(_))));

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert!(storage.latest_run().unwrap().is_none());
    assert_eq!(storage.progress_snapshot().unwrap().total(), 0);
}

#[tokio::test]
async fn test_shutdown_before_start_leaves_queue_untouched() {
    let server = MockServer::start().await;
    mount_entry(&server, "a", html(entry_page("a", "never fetched"))).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stop.sqlite");
    let config = create_test_config(
        &db_path,
        vec![format!("{}/hopper/text?doc=a", server.uri())],
    );

    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();
    let summary = run_crawl(&config, "hash", CrawlOptions::default(), Some(rx))
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.snapshot.pending, 1);
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(
        storage.latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}

#[tokio::test]
async fn test_letter_discovery_seeds_from_index_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hopper/index"))
        .and(query_param("letter", "*b"))
        .respond_with(html(
            r#"<html><body><div class="entry_list">
                <a href="text?doc=ba/llw">βάλλω</a>
                <a href="text?doc=bai/nw">βαίνω</a>
                <a href="javascript:void(0)">skip</a>
            </div></body></html>"#
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    mount_entry(&server, "ba/llw", html(entry_page("βάλλω", "throw"))).await;
    mount_entry(&server, "bai/nw", html(entry_page("βαίνω", "walk"))).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir.path().join("letters.sqlite"), vec![]);
    config.seed.letters = vec!["Β".to_string()];
    config.seed.index_url_template = Some(format!("{}/hopper/index?letter={{code}}", server.uri()));
    config.seed.link_selector = Some("div.entry_list a".to_string());

    let summary = run_crawl(&config, "hash", CrawlOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    assert!(storage.get_result("ba/llw").unwrap().is_some());
    assert!(storage.get_result("bai/nw").unwrap().is_some());
}
