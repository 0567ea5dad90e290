use crate::circuit::{CircuitBreaker, CircuitError};
use crate::orchestrator::{FailureKind, Tier, TierContext, TierError, TierFailure};
use crate::rate_limit::DomainRateLimiter;
use crate::retry::{Classify, RetryEngine, RetryError};
use crate::session::SessionManager;
use crate::Record;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs one tier of one source through the whole resilience chain
///
/// Built once when the source is registered. Each call goes through
/// circuit → retry → (rate limit → session → timeout → fetch), and every
/// attempt reports its outcome to the rate limiter and the session manager.
pub struct TierExecutor {
    source_id: String,
    /// One-based position in priority order
    index: usize,
    tier: Tier,
    circuit: Arc<CircuitBreaker>,
    retry: RetryEngine,
    rate_limiter: Arc<DomainRateLimiter>,
    sessions: Arc<SessionManager>,
    timeout: Duration,
}

impl TierExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_id: &str,
        index: usize,
        tier: Tier,
        circuit: Arc<CircuitBreaker>,
        retry: RetryEngine,
        rate_limiter: Arc<DomainRateLimiter>,
        sessions: Arc<SessionManager>,
        timeout: Duration,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            index,
            tier,
            circuit,
            retry,
            rate_limiter,
            sessions,
            timeout,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tier(&self) -> &Tier {
        &self.tier
    }

    /// Fetches records from the tier
    ///
    /// # Returns
    ///
    /// * `Ok(records)` - The tier answered (record count not yet validated)
    /// * `Err(TierFailure::CircuitOpen)` - The source's circuit rejected the call
    /// * `Err(TierFailure::Exhausted | Fatal)` - The tier failed
    /// * `Err(TierFailure::Cancelled)` - `cancel` fired
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Vec<Record>, TierFailure> {
        let outcome = self
            .circuit
            .call(|| {
                self.retry.execute_with_observer(
                    || self.attempt(cancel),
                    cancel,
                    |retry| {
                        tracing::debug!(
                            "[{}] Tier {} attempt {} failed ({:?})",
                            self.source_id,
                            self.index,
                            retry.attempt,
                            FailureKind::of(retry.error)
                        );
                    },
                )
            })
            .await;

        match outcome {
            Ok(records) => Ok(records),
            Err(CircuitError::Open(e)) => Err(TierFailure::CircuitOpen(e)),
            Err(CircuitError::Inner(RetryError::Cancelled)) => Err(TierFailure::Cancelled),
            Err(CircuitError::Inner(RetryError::Exhausted { attempts, last })) => {
                Err(TierFailure::Exhausted { attempts, last })
            }
            Err(CircuitError::Inner(RetryError::Fatal(e))) => Err(TierFailure::Fatal(e)),
        }
    }

    /// One attempt: wait for the domain, pick the session, call the tier
    async fn attempt(&self, cancel: &CancellationToken) -> Result<Vec<Record>, TierError> {
        let domain = &self.tier.domain;

        self.rate_limiter
            .wait_domain(domain, cancel)
            .await
            .map_err(|_| TierError::Cancelled)?;

        let session = self
            .sessions
            .get_session(domain)
            .map_err(|e| TierError::Other(format!("no session for {}: {}", domain, e)))?;
        session.begin_request();

        let ctx = TierContext {
            source_id: self.source_id.clone(),
            tier_name: self.tier.name.clone(),
            domain: domain.clone(),
            session,
            cancel: cancel.clone(),
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TierError::Cancelled),
            fetched = tokio::time::timeout(self.timeout, self.tier.fetcher.fetch(&ctx)) => {
                fetched.unwrap_or(Err(TierError::Timeout))
            }
        };

        match &result {
            Ok(_) => self.rate_limiter.report_success(domain),
            Err(TierError::Cancelled) => {}
            Err(e) => {
                let status = e.kind().status_code();
                self.rate_limiter.report_failure(domain, status);
                if let Some(code) = status {
                    self.sessions.report_error(domain, code);
                }
            }
        }

        result
    }
}

impl std::fmt::Debug for TierExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierExecutor")
            .field("source_id", &self.source_id)
            .field("index", &self.index)
            .field("tier", &self.tier)
            .field("circuit", &self.circuit.name())
            .finish_non_exhaustive()
    }
}
