//! End-to-end tests for task expansion and the execution engine.
//!
//! Everything here drives the public library API with scripted stub
//! handlers and stays offline, except the final test which hits a real
//! endpoint. Run that one with:
//! HARVEST_TEST_URL=https://... cargo test --test harvest_integration -- --ignored

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keyharvest::handlers;
use keyharvest::{
    collect_tasks, BackoffPolicy, Engine, EngineConfig, HandlerError, HandlerPayload,
    HandlerRegistry, HandlerResult, HarvestConfig, Job, ParamMap, SourceHandler, Task, TaskStatus,
};

/// Succeeds with a fixed number of records.
struct StaticHandler {
    records: usize,
}

#[async_trait]
impl SourceHandler for StaticHandler {
    async fn invoke(&self, keyword: &str, _params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let records = (0..self.records)
            .map(|i| serde_json::json!({"keyword": keyword, "index": i}))
            .collect();
        Ok(HandlerPayload::Records(records))
    }
}

/// Fails every invocation and counts them.
struct CountingFailHandler {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl SourceHandler for CountingFailHandler {
    async fn invoke(&self, _keyword: &str, _params: &ParamMap) -> HandlerResult<HandlerPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Http("status 503".to_string()))
    }
}

/// Tracks how many invocations are in flight at once.
struct GaugeHandler {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceHandler for GaugeHandler {
    async fn invoke(&self, _keyword: &str, _params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(HandlerPayload::Opaque)
    }
}

/// Fails the first `fail_first` invocations, then succeeds; appends its
/// name to the shared log on success.
struct ScriptedHandler {
    name: &'static str,
    fail_first: u32,
    calls: AtomicU32,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl SourceHandler for ScriptedHandler {
    async fn invoke(&self, _keyword: &str, _params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(HandlerError::Http("transient".to_string()));
        }
        self.log
            .lock()
            .expect("log mutex never poisoned")
            .push(self.name);
        Ok(HandlerPayload::Opaque)
    }
}

fn job(id: &str, source: &str, keywords: &[&str]) -> Job {
    Job::new(id, source).with_keywords(keywords.iter().copied())
}

fn single_task(source: &str, keyword: &str) -> Task {
    Task::new(Arc::new(Job::new("job", source)), keyword)
}

fn fast_config() -> EngineConfig {
    EngineConfig::default().with_backoff(BackoffPolicy::new(0.0, 0.0))
}

#[tokio::test]
async fn test_summary_partitions_every_task() {
    let mut registry = HandlerRegistry::new();
    registry.register("static", Arc::new(StaticHandler { records: 1 }));
    registry.register(
        "flaky",
        Arc::new(CountingFailHandler {
            calls: Arc::new(AtomicU32::new(0)),
        }),
    );

    let jobs = vec![
        job("a", "static", &["one", "two"]),
        job("b", "flaky", &["three"]),
        job("c", "unregistered", &["four"]),
    ];
    let tasks = collect_tasks(&jobs, &[], &[]);
    let engine = Engine::new(fast_config().with_retry_limit(0), registry).expect("valid config");

    let summary = engine.run_tasks(tasks).await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        summary.total,
        summary.success + summary.failed + summary.skipped
    );
}

#[tokio::test]
async fn test_failing_task_attempted_retry_limit_plus_one_times() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "flaky",
        Arc::new(CountingFailHandler {
            calls: Arc::clone(&calls),
        }),
    );
    let engine = Engine::new(fast_config().with_retry_limit(2), registry).expect("valid config");

    let outcome = engine.run_task(single_task("flaky", "kw")).await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_zero_retry_limit_means_single_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "flaky",
        Arc::new(CountingFailHandler {
            calls: Arc::clone(&calls),
        }),
    );
    let engine = Engine::new(fast_config().with_retry_limit(0), registry).expect("valid config");

    let outcome = engine.run_task(single_task("flaky", "kw")).await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_source_never_invoked() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "registered",
        Arc::new(CountingFailHandler {
            calls: Arc::clone(&calls),
        }),
    );
    let engine = Engine::new(EngineConfig::default(), registry).expect("valid config");

    let outcome = engine.run_task(single_task("ghost", "kw")).await;

    assert_eq!(outcome.status, TaskStatus::Skipped);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.error.as_deref(), Some("unknown source: ghost"));
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "slow",
        Arc::new(GaugeHandler {
            in_flight: Arc::clone(&in_flight),
            peak: Arc::clone(&peak),
        }),
    );

    let jobs = vec![job(
        "bulk",
        "slow",
        &["k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8"],
    )];
    let tasks = collect_tasks(&jobs, &[], &[]);
    let config = fast_config().with_max_concurrency(2);
    let engine = Engine::new(config, registry).expect("valid config");

    let summary = engine.run_tasks(tasks).await;

    assert_eq!(summary.success, 8);
    assert_eq!(
        peak.load(Ordering::SeqCst),
        2,
        "admission gate must bound parallel invocations"
    );
}

#[tokio::test]
async fn test_backoff_wait_releases_the_admission_slot() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "flaky_once",
        Arc::new(ScriptedHandler {
            name: "flaky",
            fail_first: 1,
            calls: AtomicU32::new(0),
            log: Arc::clone(&log),
        }),
    );
    registry.register(
        "fast",
        Arc::new(ScriptedHandler {
            name: "fast",
            fail_first: 0,
            calls: AtomicU32::new(0),
            log: Arc::clone(&log),
        }),
    );

    // One slot only. The fast task can finish before the flaky task's
    // second attempt only if the slot is released for the backoff wait.
    let config = EngineConfig::default()
        .with_max_concurrency(1)
        .with_retry_limit(1)
        .with_backoff(BackoffPolicy::new(0.5, 0.5));
    let engine = Engine::new(config, registry).expect("valid config");

    let (flaky, fast) = tokio::join!(
        engine.run_task(single_task("flaky_once", "kw")),
        engine.run_task(single_task("fast", "kw"))
    );

    assert_eq!(flaky.status, TaskStatus::Success);
    assert_eq!(flaky.attempts, 2);
    assert_eq!(fast.status, TaskStatus::Success);

    let order = log.lock().expect("log mutex never poisoned").clone();
    assert_eq!(order, vec!["fast", "flaky"]);
}

#[tokio::test]
async fn test_echo_run_reports_item_counts() {
    let mut params = ParamMap::new();
    params.insert("count".to_string(), serde_json::json!(3));
    let jobs = vec![Job::new("smoke", "echo")
        .with_keywords(["alpha", "beta"])
        .with_parameters(params)];

    let tasks = collect_tasks(&jobs, &[], &[]);
    assert_eq!(tasks.len(), 2);

    let engine =
        Engine::new(EngineConfig::default(), handlers::builtin_registry()).expect("valid config");
    for task in tasks.clone() {
        let outcome = engine.run_task(task).await;
        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.item_count, Some(3));
    }

    let summary = engine.run_tasks(tasks).await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_disabled_job_contributes_nothing() {
    let jobs = vec![job("a", "echo", &["x"]).disabled()];
    let tasks = collect_tasks(&jobs, &[], &[]);
    assert!(tasks.is_empty());

    let engine =
        Engine::new(EngineConfig::default(), handlers::builtin_registry()).expect("valid config");
    let summary = engine.run_tasks(tasks).await;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.success, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_config_file_drives_a_full_run() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let data_dir = dir.path().join("data");
    std::fs::create_dir(&data_dir).expect("create data dir");
    std::fs::write(data_dir.join("notes.txt"), "serde and tokio notes").expect("write fixture");

    let document = serde_json::json!({
        "global": {
            "max_concurrency": 2,
            "retry_limit": 0,
            "retry_backoff_seconds": [0, 0]
        },
        "jobs": [{
            "id": "docs",
            "source": "file_scan",
            "keywords": ["serde"],
            "parameters": {"root": data_dir.to_str().unwrap()}
        }]
    });
    let config_path = dir.path().join("harvest.json");
    std::fs::write(&config_path, document.to_string()).expect("write config");

    let config = HarvestConfig::load(&config_path).expect("load config");
    let engine_config = config.global.engine_config(None, None);
    assert_eq!(engine_config.max_concurrency, 2);

    let tasks = collect_tasks(&config.jobs, &[], &[]);
    assert_eq!(tasks.len(), 1);

    let engine = Engine::new(engine_config, handlers::builtin_registry()).expect("valid config");
    let summary = engine.run_tasks(tasks).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.success, 1);
}

#[tokio::test]
async fn test_override_chain_can_produce_invalid_engine_config() {
    let config =
        HarvestConfig::from_json(r#"{"global": {"max_concurrency": 4}}"#).expect("valid document");

    // A zero override wins the merge and must be rejected at engine
    // construction, before any task work.
    let engine_config = config.global.engine_config(Some(0), None);
    assert!(Engine::new(engine_config, handlers::builtin_registry()).is_err());
}

fn get_test_url() -> String {
    std::env::var("HARVEST_TEST_URL")
        .expect("HARVEST_TEST_URL environment variable must be set for network tests")
}

#[tokio::test]
#[ignore] // Run with: HARVEST_TEST_URL=... cargo test --test harvest_integration -- --ignored
async fn test_http_json_against_live_endpoint() {
    let mut params = ParamMap::new();
    params.insert("url".to_string(), serde_json::json!(get_test_url()));
    let jobs = vec![Job::new("live", "http_json")
        .with_keywords(["rust"])
        .with_parameters(params)];

    let engine =
        Engine::new(EngineConfig::default(), handlers::builtin_registry()).expect("valid config");
    let summary = engine.run_tasks(collect_tasks(&jobs, &[], &[])).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.success, 1, "endpoint should return valid JSON");
}
