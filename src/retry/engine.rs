use crate::retry::{compute_backoff, Classify, ErrorKind, RetryConfig};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a retried operation ultimately failed
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: fmt::Debug + fmt::Display,
{
    /// Every attempt failed with a retryable error
    #[error("Retry exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// A non-retryable error, propagated on the attempt it happened
    #[error("{0}")]
    Fatal(E),

    /// The caller cancelled while an attempt or a backoff sleep was pending
    #[error("Operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E>
where
    E: fmt::Debug + fmt::Display,
{
    /// The last error returned by the operation, if it produced one
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Fatal(e) => Some(e),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl<E> Classify for RetryError<E>
where
    E: Classify + fmt::Debug + fmt::Display,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted { last, .. } => last.kind(),
            Self::Fatal(e) => e.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.last_error().and_then(Classify::retry_after)
    }
}

/// Passed to the retry observer before each backoff sleep
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// One-based number of the attempt that just failed
    pub attempt: u32,
    pub error: &'a E,
    /// How long the engine will sleep before the next attempt
    pub delay: Duration,
}

/// Bounded-attempt executor with exponential backoff
///
/// # Example
///
/// ```no_run
/// use shelf_sentry::retry::{RetryConfig, RetryEngine};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn fetch() -> Result<u32, shelf_sentry::orchestrator::TierError> { Ok(1) }
/// # async fn example() {
/// let engine = RetryEngine::new(RetryConfig::gentle());
/// let cancel = CancellationToken::new();
/// let value = engine.execute(|| fetch(), &cancel).await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryEngine {
    config: RetryConfig,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Computes the (jittered) delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_backoff(attempt, &self.config, &mut rand::thread_rng())
    }

    /// Runs `op` until it succeeds, fails fatally, exhausts its attempts or is cancelled
    pub async fn execute<F, Fut, T, E>(
        &self,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Debug + fmt::Display,
    {
        self.execute_with_observer(op, cancel, |_| {}).await
    }

    /// Like [`execute`](Self::execute), calling `observer` before every backoff sleep
    pub async fn execute_with_observer<F, Fut, T, E, O>(
        &self,
        mut op: F,
        cancel: &CancellationToken,
        mut observer: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Debug + fmt::Display,
        O: FnMut(&RetryAttempt<'_, E>),
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;

            let kind = error.kind();
            if kind == ErrorKind::Cancelled {
                return Err(RetryError::Cancelled);
            }

            if !self.config.is_retryable(&kind) {
                tracing::debug!("Attempt {} failed with non-retryable error: {}", attempt, error);
                return Err(RetryError::Fatal(error));
            }

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let mut delay = self.delay_for(attempt - 1);
            if let Some(hint) = error.retry_after() {
                delay = delay.max(hint).min(self.config.max_delay);
            }

            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:.2}s",
                attempt,
                max_attempts,
                error,
                delay.as_secs_f64()
            );

            observer(&RetryAttempt {
                attempt,
                error: &error,
                delay,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::JitterStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        kind: ErrorKind,
        retry_after: Option<Duration>,
    }

    impl TestError {
        fn of(kind: ErrorKind) -> Self {
            Self {
                kind,
                retry_after: None,
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error {:?}", self.kind)
        }
    }

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            self.kind
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn no_jitter(max_attempts: u32) -> RetryEngine {
        RetryEngine::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: JitterStrategy::None,
            ..RetryConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_makes_exactly_max_attempts() {
        let engine = no_jitter(3);
        let calls = Arc::new(AtomicU32::new(0));
        let mut delays = Vec::new();
        let cancel = CancellationToken::new();

        let result: Result<(), _> = engine
            .execute_with_observer(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::of(ErrorKind::Timeout))
                    }
                },
                &cancel,
                |attempt| delays.push(attempt.delay),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.kind, ErrorKind::Timeout);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let engine = no_jitter(5);
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = engine
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Err(TestError::of(ErrorKind::Status(503)))
                        } else {
                            Ok(n)
                        }
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let engine = no_jitter(5);
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), _> = engine
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::of(ErrorKind::Status(404)))
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Fatal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_extends_delay() {
        let engine = no_jitter(2);
        let mut delays = Vec::new();
        let cancel = CancellationToken::new();

        let _: Result<(), _> = engine
            .execute_with_observer(
                || async {
                    Err(TestError {
                        kind: ErrorKind::Status(429),
                        retry_after: Some(Duration::from_secs(7)),
                    })
                },
                &cancel,
                |attempt| delays.push(attempt.delay),
            )
            .await;

        assert_eq!(delays, vec![Duration::from_secs(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let engine = no_jitter(5);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = engine
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::of(ErrorKind::Connection))
                    }
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_error_kind_is_not_retried() {
        let engine = no_jitter(5);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = engine
            .execute(|| async { Err(TestError::of(ErrorKind::Cancelled)) }, &cancel)
            .await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
