use crate::config::HealthConfig;
use crate::health::{AlertContext, AlertSink, HealthStatus, HealthThresholds, SourceHealth};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Serializable health snapshot of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub source_id: String,
    pub status: HealthStatus,
    pub current_tier: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub avg_response_time_secs: f64,
    pub consecutive_failures: u32,
    pub last_product_count: u64,
    pub expected_product_count: u64,
    pub product_ratio: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl HealthReport {
    fn from_source(health: &SourceHealth, thresholds: &HealthThresholds) -> Self {
        Self {
            source_id: health.source_id.clone(),
            status: health.status(thresholds),
            current_tier: health.current_tier,
            total_requests: health.total_requests,
            successful_requests: health.successful_requests,
            failed_requests: health.failed_requests,
            error_rate: health.error_rate(),
            avg_response_time_secs: health.avg_response_time().as_secs_f64(),
            consecutive_failures: health.consecutive_failures,
            last_product_count: health.last_product_count,
            expected_product_count: health.expected_product_count,
            product_ratio: health.product_ratio(),
            last_success: health.last_success_at,
            last_error: health.last_error.clone(),
            last_error_at: health.last_error_at,
        }
    }
}

/// Tracks the health of every source and raises alerts
///
/// Each source's metrics sit behind their own map entry lock. Alerts for
/// the same `(source, status)` pair are suppressed for the configured
/// cooldown.
pub struct HealthMonitor {
    config: HealthConfig,
    sources: DashMap<String, SourceHealth>,
    expected: DashMap<String, u64>,
    last_alerts: Mutex<HashMap<String, Instant>>,
    sink: RwLock<Option<Arc<dyn AlertSink>>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            sources: DashMap::new(),
            expected: DashMap::new(),
            last_alerts: Mutex::new(HashMap::new()),
            sink: RwLock::new(None),
        }
    }

    /// Sends alerts to `sink` in addition to the log
    pub fn with_alert_sink(self, sink: Arc<dyn AlertSink>) -> Self {
        self.set_alert_sink(sink);
        self
    }

    /// Replaces the alert sink of a monitor that is already shared
    pub fn set_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.config.thresholds
    }

    /// Sets the record count a source is expected to produce
    pub fn set_expected(&self, source_id: &str, expected: u64) {
        self.expected.insert(source_id.to_string(), expected);
        if let Some(mut health) = self.sources.get_mut(source_id) {
            health.expected_product_count = expected;
        }
    }

    fn with_source<R>(&self, source_id: &str, f: impl FnOnce(&mut SourceHealth) -> R) -> R {
        let mut entry = self
            .sources
            .entry(source_id.to_string())
            .or_insert_with(|| {
                let expected = self
                    .expected
                    .get(source_id)
                    .map(|e| *e.value())
                    .unwrap_or(self.config.default_expected_products);
                SourceHealth::new(
                    source_id,
                    expected,
                    self.config.outcome_window,
                    self.config.response_window,
                )
            });
        f(entry.value_mut())
    }

    /// Records a successful fetch from tier `tier` (one-based)
    pub fn record_success(
        &self,
        source_id: &str,
        response_time: Duration,
        product_count: u64,
        tier: usize,
    ) {
        self.with_source(source_id, |h| h.record_success(response_time, product_count, tier));
        tracing::debug!(
            "[{}] Success: {} products in {:.2}s (tier {})",
            source_id,
            product_count,
            response_time.as_secs_f64(),
            tier
        );
    }

    /// Records a failed fetch and alerts if the source became unhealthy
    pub fn record_failure(&self, source_id: &str, error: &str, tier: usize) {
        let context = self.with_source(source_id, |h| {
            h.record_failure(error, tier);
            let status = h.status(&self.config.thresholds);
            status.is_alerting().then(|| AlertContext {
                source_id: source_id.to_string(),
                status,
                error_rate: h.error_rate(),
                consecutive_failures: h.consecutive_failures,
                last_error: h.last_error.clone(),
                current_tier: h.current_tier,
                avg_response_time_secs: h.avg_response_time().as_secs_f64(),
            })
        });
        tracing::warn!("[{}] Failure (tier {}): {}", source_id, tier, error);

        if let Some(context) = context {
            self.alert(context);
        }
    }

    fn alert(&self, context: AlertContext) {
        let key = format!("{}:{}", context.source_id, context.status);
        {
            let mut last_alerts = self.last_alerts.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            if let Some(last) = last_alerts.get(&key) {
                if now.duration_since(*last) < self.config.alert_cooldown {
                    return;
                }
            }
            last_alerts.insert(key, now);
        }

        if context.status == HealthStatus::Critical {
            tracing::error!(
                "[ALERT] Source {} is {}: {:.0}% errors, {} consecutive failures, tier {}, last error: {}",
                context.source_id,
                context.status,
                context.error_rate * 100.0,
                context.consecutive_failures,
                context.current_tier,
                context.last_error.as_deref().unwrap_or("-")
            );
        } else {
            tracing::warn!(
                "[ALERT] Source {} is {}: {:.0}% errors, {} consecutive failures, tier {}, last error: {}",
                context.source_id,
                context.status,
                context.error_rate * 100.0,
                context.consecutive_failures,
                context.current_tier,
                context.last_error.as_deref().unwrap_or("-")
            );
        }

        let sink = self.sink.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            sink.alert(&context.source_id, context.status, &context);
        }
    }

    /// Current status of a source; sources never seen are healthy
    pub fn status(&self, source_id: &str) -> HealthStatus {
        self.sources
            .get(source_id)
            .map(|h| h.status(&self.config.thresholds))
            .unwrap_or(HealthStatus::Healthy)
    }

    /// A copy of a source's raw metrics
    pub fn source(&self, source_id: &str) -> Option<SourceHealth> {
        self.sources.get(source_id).map(|h| h.value().clone())
    }

    pub fn report_for(&self, source_id: &str) -> Option<HealthReport> {
        self.sources
            .get(source_id)
            .map(|h| HealthReport::from_source(h.value(), &self.config.thresholds))
    }

    /// Reports for every source, ordered by id
    pub fn report(&self) -> BTreeMap<String, HealthReport> {
        self.sources
            .iter()
            .map(|h| {
                (
                    h.key().clone(),
                    HealthReport::from_source(h.value(), &self.config.thresholds),
                )
            })
            .collect()
    }

    /// Human-readable one line per source
    pub fn summary(&self) -> String {
        let mut out = String::from("Source Health Summary\n");
        out.push_str(&"=".repeat(40));

        for report in self.report().values() {
            let marker = match report.status {
                HealthStatus::Healthy => "[OK]  ",
                HealthStatus::Degraded => "[WARN]",
                HealthStatus::Unhealthy => "[BAD] ",
                HealthStatus::Critical => "[CRIT]",
            };
            let _ = write!(
                out,
                "\n{} {}: {} (tier {}, {} products, {:.0}% errors)",
                marker,
                report.source_id,
                report.status,
                report.current_tier,
                report.last_product_count,
                report.error_rate * 100.0
            );
        }

        out
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("alert_cooldown", &self.config.alert_cooldown)
            .finish()
    }
}
