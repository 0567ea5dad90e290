//! Retry engine with exponential backoff and jitter
//!
//! This module is retry-policy only. It knows nothing about domains, sessions
//! or circuits; the orchestrator composes it around a single tier attempt.
//!
//! # Components
//!
//! - `RetryConfig`: attempt budget, backoff curve, jitter strategy and the set of
//!   retryable error kinds
//! - `compute_backoff`: the pure delay computation
//! - `RetryEngine`: bounded, cancellable execution of an async operation
//! - `Classify` / `ErrorKind`: how an error tells the engine what it is

mod backoff;
mod classify;
mod engine;

pub use backoff::{compute_backoff, JitterStrategy};
pub use classify::{Classify, ErrorKind};
pub use engine::{RetryAttempt, RetryEngine, RetryError};

use crate::config::deserialize_secs;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    /// Total number of calls, including the first one
    pub max_attempts: u32,

    #[serde(deserialize_with = "deserialize_secs")]
    pub base_delay: Duration,

    /// Upper bound for any single inter-attempt delay
    #[serde(deserialize_with = "deserialize_secs")]
    pub max_delay: Duration,

    pub exponential_base: f64,

    pub jitter: JitterStrategy,

    pub retry_on_timeout: bool,

    pub retry_on_connection: bool,

    /// HTTP status codes that trigger another attempt
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: JitterStrategy::Full,
            retry_on_timeout: true,
            retry_on_connection: true,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Few, quick retries for cheap endpoints
    pub fn gentle() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Many, slow retries for endpoints that are known to flap
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            ..Self::default()
        }
    }

    /// Returns whether an error of this kind earns another attempt
    pub fn is_retryable(&self, kind: &ErrorKind) -> bool {
        match kind {
            ErrorKind::Timeout => self.retry_on_timeout,
            ErrorKind::Connection => self.retry_on_connection,
            ErrorKind::Status(code) => self.retryable_status_codes.contains(code),
            ErrorKind::Parse | ErrorKind::Cancelled | ErrorKind::Other => false,
        }
    }
}
