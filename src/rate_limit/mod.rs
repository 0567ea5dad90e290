//! Adaptive per-domain rate limiting
//!
//! The limiter widens the gap between requests when a domain pushes back
//! (errors, HTTP 429) and slowly narrows it again after a streak of successes.
//!
//! # Components
//!
//! - `RateLimitConfig`: bounds and adaptation factors
//! - `AdaptiveRateLimiter`: the delay state for a single domain
//! - `DomainRateLimiter`: lazily-created limiters keyed by domain

mod adaptive;
mod domain;

pub use adaptive::{AdaptiveRateLimiter, RateLimiterStats};
pub use domain::DomainRateLimiter;

use crate::config::deserialize_secs;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for an adaptive rate limiter
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    /// Target request rate; the starting delay is `60 / requests_per_minute`
    pub requests_per_minute: f64,

    /// The delay never shrinks below this
    #[serde(deserialize_with = "deserialize_secs")]
    pub min_delay: Duration,

    /// The delay never grows beyond this
    #[serde(deserialize_with = "deserialize_secs")]
    pub max_delay: Duration,

    /// Applied to the delay on every reported failure
    pub backoff_multiplier: f64,

    /// Applied to the delay after `success_threshold` consecutive successes
    pub recovery_factor: f64,

    pub success_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10.0,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            recovery_factor: 0.9,
            success_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    /// Starting delay derived from the target rate, clamped to the configured bounds
    pub fn initial_delay(&self) -> Duration {
        let secs = if self.requests_per_minute > 0.0 {
            60.0 / self.requests_per_minute
        } else {
            self.max_delay.as_secs_f64()
        };
        clamp_secs(secs, self.min_delay, self.max_delay)
    }
}

/// Clamps a number of seconds into `[min, max]`
pub(crate) fn clamp_secs(secs: f64, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (min.as_secs_f64(), max.as_secs_f64().max(min.as_secs_f64()));
    let secs = if secs.is_finite() { secs } else { hi };
    Duration::from_secs_f64(secs.clamp(lo, hi))
}
