use crate::circuit::{CircuitBreakerConfig, CircuitState};
use crate::retry::{Classify, ErrorKind};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Retry-after hint given when a half-open circuit has no probe slots left
const HALF_OPEN_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Raised instead of calling a guarded operation while the circuit rejects calls
///
/// This is not an upstream failure: callers should stop trying for now rather
/// than retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit '{name}' is open, retry after {:.1}s", .retry_after.as_secs_f64())]
pub struct CircuitOpenError {
    pub name: String,
    pub retry_after: Duration,
}

/// Outcome of [`CircuitBreaker::call`] when it doesn't succeed
#[derive(Debug, Error)]
pub enum CircuitError<E>
where
    E: fmt::Debug + fmt::Display,
{
    #[error(transparent)]
    Open(CircuitOpenError),

    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a circuit, safe to serialize into reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub state_transitions: u64,
    pub last_failure_secs_ago: Option<f64>,
    pub last_success_secs_ago: Option<f64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Consecutive failures since the circuit last closed
    failure_count: u32,
    /// Consecutive successful probes while half-open
    success_count: u32,
    half_open_calls: u32,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
    state_transitions: u64,
}

/// A named circuit breaker
///
/// All state lives behind one mutex that is never held across an await, so a
/// breaker can be shared freely between tasks.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                opened_at: None,
                last_failure: None,
                last_success: None,
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                rejected_requests: 0,
                state_transitions: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state, moving an expired Open circuit to HalfOpen
    pub fn state(&self) -> CircuitState {
        let mut state = self.lock();
        self.refresh(&mut state);
        state.state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Runs `op` if the circuit admits the call and records its outcome
    ///
    /// Errors classified as [`ErrorKind::Cancelled`] are passed through
    /// without counting as a failure.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The operation succeeded
    /// * `Err(CircuitError::Open)` - The call was rejected without running `op`
    /// * `Err(CircuitError::Inner)` - The operation ran and failed
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Debug + fmt::Display,
    {
        let probing = self.admit().map_err(CircuitError::Open)?;

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Cancelled {
                    if probing {
                        self.release_probe();
                    }
                } else {
                    self.record_failure();
                }
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Counts a request and decides whether it may run
    ///
    /// Returns whether the admitted call occupies a half-open probe slot.
    fn admit(&self) -> Result<bool, CircuitOpenError> {
        let mut state = self.lock();
        state.total_requests += 1;
        self.refresh(&mut state);

        match state.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                state.rejected_requests += 1;
                let elapsed = state
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: self.config.recovery_timeout.saturating_sub(elapsed),
                })
            }
            CircuitState::HalfOpen => {
                if state.half_open_calls >= self.config.half_open_max_calls {
                    state.rejected_requests += 1;
                    return Err(CircuitOpenError {
                        name: self.name.clone(),
                        retry_after: HALF_OPEN_RETRY_AFTER,
                    });
                }
                state.half_open_calls += 1;
                Ok(true)
            }
        }
    }

    fn release_probe(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            state.half_open_calls = state.half_open_calls.saturating_sub(1);
        }
    }

    /// Records a successful call made outside of [`call`](Self::call)
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.successful_requests += 1;
        state.last_success = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Records a failed call made outside of [`call`](Self::call)
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failed_requests += 1;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => self.transition(&mut state, CircuitState::Open),
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                self.transition(&mut state, CircuitState::Open)
            }
            _ => {}
        }
    }

    /// Forces the circuit closed for manual recovery
    pub fn reset(&self) {
        let mut state = self.lock();
        self.transition(&mut state, CircuitState::Closed);
        tracing::info!("Circuit '{}' manually reset", self.name);
    }

    pub fn stats(&self) -> CircuitStats {
        let mut state = self.lock();
        self.refresh(&mut state);
        CircuitStats {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            rejected_requests: state.rejected_requests,
            state_transitions: state.state_transitions,
            last_failure_secs_ago: state.last_failure.map(|t| t.elapsed().as_secs_f64()),
            last_success_secs_ago: state.last_success.map(|t| t.elapsed().as_secs_f64()),
        }
    }

    /// Moves an Open circuit whose recovery timeout elapsed to HalfOpen
    fn refresh(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let expired = state
            .opened_at
            .map_or(true, |t| t.elapsed() >= self.config.recovery_timeout);
        if expired {
            self.transition(state, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        state.state_transitions += 1;

        match to {
            CircuitState::Closed => {
                state.failure_count = 0;
                state.success_count = 0;
                state.half_open_calls = 0;
                state.opened_at = None;
            }
            CircuitState::Open => {
                state.success_count = 0;
                state.half_open_calls = 0;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                state.success_count = 0;
                state.half_open_calls = 0;
            }
        }

        if to == CircuitState::Open {
            tracing::warn!(
                "Circuit '{}' {} -> {} after {} failures",
                self.name,
                from,
                to,
                state.failure_count
            );
        } else {
            tracing::info!("Circuit '{}' {} -> {}", self.name, from, to);
        }
    }
}
