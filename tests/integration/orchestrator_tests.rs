//! Integration tests for tier fallback and the stale-cache path
//!
//! Tiers here are in-process closures, so these tests exercise the
//! orchestrator's composition without a network.

use chrono::Utc;
use serde_json::json;
use shelf_sentry::cache::CachedResult;
use shelf_sentry::orchestrator::{
    FetchError, FetchOrigin, Orchestrator, OrchestratorConfig, SourceConfig, Tier, TierContext,
    TierError,
};
use shelf_sentry::{CircuitState, HealthStatus, Record};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// An orchestrator with short delays and a data dir under `dir`
fn test_orchestrator(dir: &TempDir) -> Orchestrator {
    let mut config = OrchestratorConfig::default();
    config.paths.data_dir = dir.path().to_path_buf();
    config.network.timeout = Duration::from_secs(5);
    config.rate_limit.default.requests_per_minute = 6000.0;
    config.rate_limit.default.min_delay = Duration::from_millis(5);
    config.rate_limit.default.max_delay = Duration::from_millis(50);
    config.retry.max_attempts = 2;
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(20);
    config.session.cookie_persistence = false;
    Orchestrator::new(config)
}

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| json!({"name": format!("product {}", i), "price": 1.0 + i as f64}))
        .collect()
}

fn returning(name: &str, domain: &str, n: usize) -> Tier {
    Tier::from_fn(name, domain, move |_ctx: TierContext| async move {
        Ok::<_, TierError>(records(n))
    })
}

fn failing(name: &str, domain: &str, calls: Arc<AtomicU32>) -> Tier {
    Tier::from_fn(name, domain, move |_ctx: TierContext| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Vec<Record>, _>(TierError::status(503))
        }
    })
}

async fn seed_cache(orchestrator: &Orchestrator, source_id: &str, count: usize, hours_old: i64) {
    let mut cached = CachedResult::new(source_id, records(count));
    cached.cached_at = Utc::now() - chrono::Duration::hours(hours_old);
    orchestrator.cache().put(cached).await.unwrap();
}

#[tokio::test]
async fn test_small_result_falls_through_to_next_tier() {
    let dir = TempDir::new().unwrap();
    let orchestrator = test_orchestrator(&dir);

    orchestrator
        .register_source(
            SourceConfig::new("billa", "Billa")
                .with_min_products(50)
                .with_tier(returning("direct", "www.billa.bg", 10).with_priority(1))
                .with_tier(returning("aggregator", "katalozi.bg", 60).with_priority(2)),
        )
        .unwrap();

    let result = orchestrator
        .fetch_source("billa", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.from_cache());
    assert_eq!(result.product_count(), 60);
    assert_eq!(result.tier_index(), Some(2));
    assert_eq!(result.tier_name(), "aggregator");

    let cached = orchestrator.cache().load("billa").await.unwrap().unwrap();
    assert_eq!(cached.product_count, 60);
    assert!(orchestrator.cache().path_for("billa").exists());

    let health = orchestrator.health().source("billa").unwrap();
    assert_eq!(health.failed_requests, 1);
    assert_eq!(health.successful_requests, 1);
    assert_eq!(health.current_tier, 2);
}

#[tokio::test]
async fn test_all_tiers_fail_serves_stale_cache() {
    let dir = TempDir::new().unwrap();
    let orchestrator = test_orchestrator(&dir);
    let calls = Arc::new(AtomicU32::new(0));

    orchestrator
        .register_source(
            SourceConfig::new("lidl", "Lidl")
                .with_tier(failing("direct", "www.lidl.bg", calls.clone()))
                .with_tier(failing("aggregator", "katalozi.bg", calls.clone()).with_priority(2)),
        )
        .unwrap();
    seed_cache(&orchestrator, "lidl", 120, 5).await;

    let result = orchestrator
        .fetch_source("lidl", &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.from_cache());
    assert_eq!(result.product_count(), 120);
    let age = result.cache_age_hours().unwrap();
    assert!((age - 5.0).abs() < 0.01, "cache age was {}", age);
    assert!(matches!(result.origin, FetchOrigin::Cached { .. }));

    // Two tiers, two attempts each
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_total_failure_without_cache() {
    let dir = TempDir::new().unwrap();
    let orchestrator = test_orchestrator(&dir);

    orchestrator
        .register_source(SourceConfig::new("metro", "Metro").with_tier(failing(
            "direct",
            "metro.bg",
            Arc::new(AtomicU32::new(0)),
        )))
        .unwrap();

    let err = orchestrator
        .fetch_source("metro", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::TotalFailure {
            source_id: "metro".to_string()
        }
    );
}

#[tokio::test]
async fn test_open_circuit_goes_straight_to_cache() {
    let dir = TempDir::new().unwrap();
    let orchestrator = test_orchestrator(&dir);
    let calls = Arc::new(AtomicU32::new(0));

    orchestrator
        .register_source(
            SourceConfig::new("kaufland", "Kaufland")
                .with_circuit(1, Duration::from_secs(300))
                .with_tier(failing("direct", "www.kaufland.bg", calls.clone())),
        )
        .unwrap();
    seed_cache(&orchestrator, "kaufland", 80, 2).await;

    let cancel = CancellationToken::new();
    let first = orchestrator.fetch_source("kaufland", &cancel).await.unwrap();
    assert!(first.from_cache());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let circuit = orchestrator.circuits().get("kaufland").unwrap();
    assert_eq!(circuit.state(), CircuitState::Open);

    let second = orchestrator.fetch_source("kaufland", &cancel).await.unwrap();
    assert!(second.from_cache());
    assert_eq!(second.product_count(), 80);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "open circuit must not call tiers");

    assert!(orchestrator.reset_circuit("kaufland"));
    assert_eq!(circuit.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cancel_records_nothing() {
    let dir = TempDir::new().unwrap();
    let orchestrator = test_orchestrator(&dir);

    orchestrator
        .register_source(
            SourceConfig::new("fantastico", "Fantastico")
                .with_circuit(1, Duration::from_secs(300))
                .with_tier(Tier::from_fn("slow", "fantastico.bg", |_ctx| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, TierError>(Vec::new())
                })),
        )
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .fetch_source("fantastico", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Cancelled);

    let circuit = orchestrator.circuits().get("fantastico").unwrap();
    assert!(circuit.is_closed());
    assert_eq!(circuit.stats().failed_requests, 0);
    assert!(orchestrator.health().source("fantastico").is_none());
}

#[tokio::test]
async fn test_scrape_all_and_alerts() {
    let dir = TempDir::new().unwrap();
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = alerts.clone();

    let orchestrator = Arc::new(test_orchestrator(&dir).with_alert_sink(Arc::new(
        move |source: &str, status: HealthStatus, _ctx: &shelf_sentry::health::AlertContext| {
            sink.lock().unwrap().push((source.to_string(), status));
        },
    )));

    orchestrator
        .register_source(
            SourceConfig::new("billa", "Billa")
                .with_min_products(4)
                .with_expected_products(4)
                .with_tier(returning("direct", "www.billa.bg", 4)),
        )
        .unwrap();
    orchestrator
        .register_source(SourceConfig::new("metro", "Metro").with_tier(failing(
            "direct",
            "metro.bg",
            Arc::new(AtomicU32::new(0)),
        )))
        .unwrap();

    let results = orchestrator.scrape_all(&CancellationToken::new()).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results["billa"].as_ref().unwrap().product_count(), 4);
    assert!(results["metro"].is_err());

    let alerts = alerts.lock().unwrap();
    assert_eq!(alerts.as_slice(), &[("metro".to_string(), HealthStatus::Critical)]);

    let report = orchestrator.health_report();
    assert_eq!(report.sources["billa"].status, HealthStatus::Healthy);
    assert_eq!(report.sources["metro"].status, HealthStatus::Critical);
    assert!(report.sessions.contains_key("metro.bg"));

    let summary = orchestrator.health_summary();
    assert!(summary.contains("billa"));
    assert!(summary.contains("metro"));
}
