//! Per-source health tracking and alerting
//!
//! Every fetch outcome of a source lands here. From rolling windows of recent
//! outcomes and response times, the consecutive-failure streak and the last
//! record count, the monitor derives a `HealthStatus` and raises rate-limited
//! alerts when a source becomes unhealthy.

mod alert;
mod monitor;
mod source;

pub use alert::{AlertContext, AlertSink};
pub use monitor::{HealthMonitor, HealthReport};
pub use source::SourceHealth;

use crate::config::deserialize_secs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Severity levels, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Primary tier working, metrics within bounds
    Healthy,
    /// Running on a fallback tier or with reduced performance
    Degraded,
    /// Significant issues that may need intervention
    Unhealthy,
    /// Failing outright; likely serving stale data
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Critical => "critical",
        }
    }

    /// Whether this status warrants an alert
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Critical)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boundaries between the health levels
///
/// Rates and times trigger a level when reached; product ratios trigger it
/// when at or below the bound.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HealthThresholds {
    pub degraded_error_rate: f64,
    pub unhealthy_error_rate: f64,
    pub critical_error_rate: f64,

    #[serde(deserialize_with = "deserialize_secs")]
    pub degraded_response_time: Duration,
    #[serde(deserialize_with = "deserialize_secs")]
    pub unhealthy_response_time: Duration,
    #[serde(deserialize_with = "deserialize_secs")]
    pub critical_response_time: Duration,

    pub degraded_product_ratio: f64,
    pub unhealthy_product_ratio: f64,
    pub critical_product_ratio: f64,

    pub degraded_consecutive_failures: u32,
    pub unhealthy_consecutive_failures: u32,
    pub critical_consecutive_failures: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_error_rate: 0.20,
            unhealthy_error_rate: 0.40,
            critical_error_rate: 0.60,
            degraded_response_time: Duration::from_secs(5),
            unhealthy_response_time: Duration::from_secs(10),
            critical_response_time: Duration::from_secs(30),
            degraded_product_ratio: 0.80,
            unhealthy_product_ratio: 0.50,
            critical_product_ratio: 0.20,
            degraded_consecutive_failures: 2,
            unhealthy_consecutive_failures: 4,
            critical_consecutive_failures: 6,
        }
    }
}
