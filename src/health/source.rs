use crate::health::{HealthStatus, HealthThresholds};
use crate::ring::RingBuffer;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Rolling health metrics of one source
#[derive(Debug, Clone)]
pub struct SourceHealth {
    pub source_id: String,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    pub last_product_count: u64,
    pub expected_product_count: u64,

    /// One-based index of the tier that produced the latest outcome
    pub current_tier: usize,
    pub consecutive_failures: u32,

    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,

    outcomes: RingBuffer<bool>,
    response_times: RingBuffer<Duration>,
}

impl SourceHealth {
    pub fn new(
        source_id: impl Into<String>,
        expected_product_count: u64,
        outcome_window: usize,
        response_window: usize,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            last_product_count: 0,
            expected_product_count,
            current_tier: 1,
            consecutive_failures: 0,
            last_error: None,
            last_error_at: None,
            last_success_at: None,
            outcomes: RingBuffer::new(outcome_window),
            response_times: RingBuffer::new(response_window),
        }
    }

    pub fn record_success(&mut self, response_time: Duration, product_count: u64, tier: usize) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.last_success_at = Some(Utc::now());
        self.last_product_count = product_count;
        self.current_tier = tier;
        self.response_times.push(response_time);
        self.outcomes.push(true);
    }

    pub fn record_failure(&mut self, error: &str, tier: usize) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(Utc::now());
        self.current_tier = tier;
        self.outcomes.push(false);
    }

    /// Share of failures among the recent outcomes
    pub fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    /// Mean of the recent response times
    pub fn avg_response_time(&self) -> Duration {
        if self.response_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.response_times.iter().sum();
        total / self.response_times.len() as u32
    }

    /// Last record count relative to the expected baseline
    pub fn product_ratio(&self) -> f64 {
        if self.expected_product_count == 0 {
            return 1.0;
        }
        self.last_product_count as f64 / self.expected_product_count as f64
    }

    /// Derives the status, checking critical conditions first
    ///
    /// Product ratios only count once a record count has been observed.
    pub fn status(&self, t: &HealthThresholds) -> HealthStatus {
        let error_rate = self.error_rate();
        let response_time = self.avg_response_time();
        let has_products = self.last_product_count > 0;
        let ratio = self.product_ratio();

        let breaches = |failures: u32, rate: f64, time: Duration, product_ratio: f64| {
            self.consecutive_failures >= failures
                || error_rate >= rate
                || response_time >= time
                || (has_products && ratio <= product_ratio)
        };

        if breaches(
            t.critical_consecutive_failures,
            t.critical_error_rate,
            t.critical_response_time,
            t.critical_product_ratio,
        ) {
            HealthStatus::Critical
        } else if breaches(
            t.unhealthy_consecutive_failures,
            t.unhealthy_error_rate,
            t.unhealthy_response_time,
            t.unhealthy_product_ratio,
        ) {
            HealthStatus::Unhealthy
        } else if self.current_tier > 1
            || breaches(
                t.degraded_consecutive_failures,
                t.degraded_error_rate,
                t.degraded_response_time,
                t.degraded_product_ratio,
            )
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> SourceHealth {
        SourceHealth::new("billa", 200, 20, 50)
    }

    #[test]
    fn test_fresh_source_is_healthy() {
        let h = health();
        assert_eq!(h.error_rate(), 0.0);
        assert_eq!(h.avg_response_time(), Duration::ZERO);
        assert_eq!(h.status(&HealthThresholds::default()), HealthStatus::Healthy);
    }

    #[test]
    fn test_consecutive_failure_levels() {
        let t = HealthThresholds::default();
        let mut h = health();
        // Enough successes to keep the error rate low
        for _ in 0..18 {
            h.record_success(Duration::from_secs(1), 200, 1);
        }
        h.record_failure("timeout", 1);
        assert_eq!(h.status(&t), HealthStatus::Healthy);
        h.record_failure("timeout", 1);
        assert_eq!(h.status(&t), HealthStatus::Degraded);
    }

    #[test]
    fn test_error_rate_window() {
        let mut h = SourceHealth::new("lidl", 40, 4, 50);
        h.record_failure("503", 1);
        h.record_failure("503", 1);
        for _ in 0..4 {
            h.record_success(Duration::from_millis(200), 40, 1);
        }
        // Failures have rolled out of the window
        assert_eq!(h.error_rate(), 0.0);
        assert_eq!(h.failed_requests, 2);
        assert_eq!(h.total_requests, 6);
    }

    #[test]
    fn test_fallback_tier_is_degraded() {
        let mut h = health();
        h.record_success(Duration::from_secs(1), 200, 2);
        assert_eq!(h.status(&HealthThresholds::default()), HealthStatus::Degraded);
    }

    #[test]
    fn test_product_ratio_levels() {
        let t = HealthThresholds::default();
        let mut h = health();

        h.record_success(Duration::from_secs(1), 150, 1);
        assert_eq!(h.product_ratio(), 0.75);
        assert_eq!(h.status(&t), HealthStatus::Degraded);

        h.record_success(Duration::from_secs(1), 30, 1);
        assert_eq!(h.status(&t), HealthStatus::Critical);
    }

    #[test]
    fn test_zero_products_ignore_ratio() {
        let mut h = health();
        h.record_success(Duration::from_secs(1), 0, 1);
        assert_eq!(h.status(&HealthThresholds::default()), HealthStatus::Healthy);
    }

    #[test]
    fn test_slow_responses() {
        let t = HealthThresholds::default();
        let mut h = health();
        h.record_success(Duration::from_secs(8), 200, 1);
        h.record_success(Duration::from_secs(14), 200, 1);
        assert_eq!(h.avg_response_time(), Duration::from_secs(11));
        assert_eq!(h.status(&t), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_critical_wins_over_unhealthy() {
        let t = HealthThresholds::default();
        let mut h = health();
        for _ in 0..6 {
            h.record_failure("connection refused", 3);
        }
        assert_eq!(h.error_rate(), 1.0);
        assert_eq!(h.status(&t), HealthStatus::Critical);
        assert_eq!(h.last_error.as_deref(), Some("connection refused"));
        assert_eq!(h.current_tier, 3);
    }
}
