//! Circuit breakers guarding persistently failing upstreams
//!
//! A circuit is a three-state guard:
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected immediately with a `CircuitOpenError`
//! - HalfOpen: a limited number of probe calls decide whether to close again
//!
//! Circuits are named and live in a `CircuitRegistry` for the lifetime of the
//! process.

mod breaker;
mod registry;

pub use breaker::{CircuitBreaker, CircuitError, CircuitOpenError, CircuitStats};
pub use registry::CircuitRegistry;

use crate::config::deserialize_secs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The three states of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        write!(f, "{}", s)
    }
}

/// Thresholds of a circuit breaker
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls before probing (seconds)
    #[serde(deserialize_with = "deserialize_secs")]
    pub recovery_timeout: Duration,

    /// Probe calls admitted while half-open
    pub half_open_max_calls: u32,

    /// Successful probes needed to close a half-open circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(300),
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}
