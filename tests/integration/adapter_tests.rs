//! Integration tests for configured HTTP tiers
//!
//! These tests use wiremock to serve pages and APIs and drive them through
//! `Orchestrator::from_config`, the same path the binary takes.

use shelf_sentry::config::{parse_config, Config};
use shelf_sentry::orchestrator::{FetchError, Orchestrator};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OFFERS_PAGE: &str = r#"
<html><body>
  <article class="offer"><h2>Кашкавал Витоша</h2><span class="price">12.99</span></article>
  <article class="offer"><h2>Луканка</h2><span class="price">8.49</span></article>
  <article class="offer"><h2>Домати</h2></article>
</body></html>
"#;

/// Builds a config with fast limits whose tiers point at `tiers` (TOML fragment)
fn config_with(dir: &TempDir, tiers: &str) -> Config {
    let toml = format!(
        r#"
        [paths]
        data-dir = '{}'

        [network]
        timeout = 5
        connect-timeout = 2

        [retry]
        max-attempts = 2
        base-delay = 0.01
        max-delay = 0.05

        [rate-limit.default]
        requests-per-minute = 6000
        min-delay = 0.005
        max-delay = 0.1

        [[source]]
        id = "billa"
        display-name = "Billa"
        min-products = 2

        {}
        "#,
        dir.path().display(),
        tiers
    );
    parse_config(&toml).unwrap()
}

#[tokio::test]
async fn test_html_tier_extracts_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offers"))
        .and(header_exists("user-agent"))
        .and(header_exists("accept-language"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OFFERS_PAGE))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_with(
        &dir,
        &format!(
            r#"
            [[source.tier]]
            name = "direct"
            url = "{}/offers"
            kind = "html"
            selector = "article.offer"
            fields = {{ name = "h2", price = "span.price" }}
            "#,
            server.uri()
        ),
    );

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let result = orchestrator
        .fetch_source("billa", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.product_count(), 3);
    assert_eq!(result.records[0]["name"], "Кашкавал Витоша");
    assert_eq!(result.records[1]["price"], "8.49");
    assert!(result.records[2]["price"].is_null());
    assert!(dir.path().join("cache").join("billa_cache.json").exists());
}

#[tokio::test]
async fn test_failing_direct_tier_falls_back_to_json_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offers"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/offers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"items": [{"name": "Хляб"}, {"name": "Мляко"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_with(
        &dir,
        &format!(
            r#"
            [[source.tier]]
            name = "direct"
            priority = 1
            url = "{uri}/offers"
            kind = "html"
            selector = "article.offer"

            [[source.tier]]
            name = "api"
            priority = 2
            url = "{uri}/api/offers"
            kind = "json"
            pointer = "/data/items"
            "#,
            uri = server.uri()
        ),
    );

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let result = orchestrator
        .fetch_source("billa", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.tier_name(), "api");
    assert_eq!(result.product_count(), 2);

    let domain = shelf_sentry::domain_from_str(&server.uri()).unwrap();
    let limiter = orchestrator.rate_limiter().stats_for(&domain).unwrap();
    assert_eq!(limiter.consecutive_failures, 0);
    assert_eq!(limiter.consecutive_successes, 1);
}

#[tokio::test]
async fn test_rate_limited_tier_honors_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/offers"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config_with(
        &dir,
        &format!(
            r#"
            [[source.tier]]
            name = "api"
            url = "{}/api/offers"
            kind = "json"
            "#,
            server.uri()
        ),
    );
    config.retry.max_delay = Duration::from_secs(2);

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let started = std::time::Instant::now();
    let err = orchestrator
        .fetch_source("billa", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TotalFailure { .. }));
    assert!(started.elapsed() >= Duration::from_secs(1));

    // 429 rotates the session identity
    let domain = shelf_sentry::domain_from_str(&server.uri()).unwrap();
    let session = orchestrator.sessions().current(&domain).unwrap();
    assert!(session.should_rotate());
    assert_eq!(session.error_count(), 1);
}

#[tokio::test]
async fn test_malformed_json_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/offers"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_with(
        &dir,
        &format!(
            r#"
            [[source.tier]]
            name = "api"
            url = "{}/api/offers"
            kind = "json"
            "#,
            server.uri()
        ),
    );

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let err = orchestrator
        .fetch_source("billa", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TotalFailure { .. }));

    let health = orchestrator.health().report_for("billa").unwrap();
    assert_eq!(health.failed_requests, 1);
    assert!(health
        .last_error
        .unwrap()
        .starts_with("Failed to extract records"));
}
