use crate::rate_limit::{clamp_secs, RateLimitConfig};
use crate::ring::RingBuffer;
use crate::Cancelled;
use rand::Rng;
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How many recent request instants are kept for the per-minute count
const REQUEST_HISTORY: usize = 100;

/// Jitter standard deviation as a fraction of the current delay
const JITTER_FRACTION: f64 = 0.3;

/// Extra slowdown applied on top of the multiplier for HTTP 429
const TOO_MANY_REQUESTS_PENALTY: f64 = 1.5;

/// Snapshot of a limiter, used in health reports and logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    pub current_delay_secs: f64,
    pub initial_delay_secs: f64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    /// The delay is more than twice its starting value
    pub is_throttled: bool,
    pub requests_last_minute: usize,
}

#[derive(Debug)]
struct LimiterState {
    /// Current delay in seconds, always within `[min_delay, max_delay]`
    delay: f64,
    consecutive_successes: u32,
    consecutive_failures: u32,
    /// Instant the most recent (possibly still pending) request was scheduled for
    last_request: Option<Instant>,
    history: RingBuffer<Instant>,
}

/// Adaptive delay between consecutive requests to one domain
///
/// Concurrent callers of [`wait`](Self::wait) are serialized: each one
/// reserves the next slot under the lock and sleeps outside of it, so two
/// requests never start closer together than the (jittered) delay.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    config: RateLimitConfig,
    initial_delay: Duration,
    state: Mutex<LimiterState>,
}

impl AdaptiveRateLimiter {
    /// Creates a limiter starting at `initial_delay` (clamped to the config bounds)
    pub fn new(initial_delay: Duration, config: RateLimitConfig) -> Self {
        let initial_delay = clamp_secs(
            initial_delay.as_secs_f64(),
            config.min_delay,
            config.max_delay,
        );

        Self {
            state: Mutex::new(LimiterState {
                delay: initial_delay.as_secs_f64(),
                consecutive_successes: 0,
                consecutive_failures: 0,
                last_request: None,
                history: RingBuffer::new(REQUEST_HISTORY),
            }),
            initial_delay,
            config,
        }
    }

    /// Creates a limiter whose starting delay is derived from `requests_per_minute`
    pub fn from_config(config: RateLimitConfig) -> Self {
        Self::new(config.initial_delay(), config)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits until the next request to this domain may start
    ///
    /// The first call never waits. Later calls wait until a jittered delay has
    /// elapsed since the previous request was scheduled.
    ///
    /// # Returns
    ///
    /// * `Ok(Duration)` - How long the caller actually slept
    /// * `Err(Cancelled)` - The token fired while waiting
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<Duration, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let wait = {
            let mut state = self.lock();
            let now = Instant::now();
            let target = match state.last_request {
                Some(last) => {
                    let jittered = self.jittered(state.delay, &mut rand::thread_rng());
                    (last + jittered).max(now)
                }
                None => now,
            };
            state.last_request = Some(target);
            state.history.push(target);
            target - now
        };

        if !wait.is_zero() {
            tracing::debug!("Rate limit: sleeping {:.2}s", wait.as_secs_f64());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        Ok(wait)
    }

    /// Normally-distributed jitter around `delay`, clamped to the config bounds
    fn jittered<R: Rng + ?Sized>(&self, delay: f64, rng: &mut R) -> Duration {
        let jitter = gaussian(rng) * delay * JITTER_FRACTION;
        clamp_secs(delay + jitter, self.config.min_delay, self.config.max_delay)
    }

    /// Records a successful request; every `success_threshold` successes in a
    /// row shrink the delay by `recovery_factor`
    pub fn report_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.consecutive_successes += 1;

        if state.consecutive_successes >= self.config.success_threshold {
            let old = state.delay;
            state.delay = (old * self.config.recovery_factor)
                .max(self.config.min_delay.as_secs_f64());
            state.consecutive_successes = 0;
            tracing::debug!("Rate limit relaxed: {:.2}s -> {:.2}s", old, state.delay);
        }
    }

    /// Records a failed request and grows the delay
    ///
    /// HTTP 429 grows it by an extra factor on top of `backoff_multiplier`.
    pub fn report_failure(&self, status: Option<u16>) {
        let mut state = self.lock();
        state.consecutive_successes = 0;
        state.consecutive_failures += 1;

        let old = state.delay;
        let mut delay = old * self.config.backoff_multiplier;
        if status == Some(429) {
            delay *= TOO_MANY_REQUESTS_PENALTY;
            tracing::warn!("Rate limited (429): backing off to {:.2}s", delay);
        }
        state.delay =
            clamp_secs(delay, self.config.min_delay, self.config.max_delay).as_secs_f64();
        tracing::debug!("Rate limit tightened: {:.2}s -> {:.2}s", old, state.delay);
    }

    /// Restores the starting delay and forgets all streaks and history
    pub fn reset(&self) {
        let mut state = self.lock();
        state.delay = self.initial_delay.as_secs_f64();
        state.consecutive_successes = 0;
        state.consecutive_failures = 0;
        state.last_request = None;
        state.history.clear();
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_secs_f64(self.lock().delay)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn stats(&self) -> RateLimiterStats {
        let state = self.lock();
        let now = Instant::now();
        let minute = Duration::from_secs(60);
        let initial = self.initial_delay.as_secs_f64();

        RateLimiterStats {
            current_delay_secs: state.delay,
            initial_delay_secs: initial,
            consecutive_successes: state.consecutive_successes,
            consecutive_failures: state.consecutive_failures,
            is_throttled: state.delay > initial * 2.0,
            requests_last_minute: state
                .history
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < minute)
                .count(),
        }
    }
}

/// Standard normal sample (Box-Muller)
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
