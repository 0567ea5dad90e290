use crate::retry::{Classify, ErrorKind};
use crate::session::BrowserSession;
use crate::Record;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a single tier call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {code}")]
    Status {
        code: u16,
        /// Server hint from the `Retry-After` header
        retry_after: Option<Duration>,
    },

    #[error("Failed to extract records: {0}")]
    Parse(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl TierError {
    pub fn status(code: u16) -> Self {
        Self::Status {
            code,
            retry_after: None,
        }
    }
}

impl Classify for TierError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Status { code, .. } => ErrorKind::Status(*code),
            Self::Parse(_) => ErrorKind::Parse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            Self::status(status.as_u16())
        } else if e.is_decode() || e.is_body() {
            Self::Parse(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Everything a tier gets to work with during one attempt
#[derive(Debug, Clone)]
pub struct TierContext {
    pub source_id: String,
    pub tier_name: String,
    pub domain: String,
    /// Current browser identity for `domain`; use its client for requests
    pub session: Arc<BrowserSession>,
    /// Fires when the caller gives up on the fetch
    pub cancel: CancellationToken,
}

/// A way of obtaining records from a source
///
/// Implementations must finish or fail within the network timeout; the
/// executor drops the future when the timeout or the cancellation token fires.
#[async_trait]
pub trait TierFetcher: Send + Sync {
    async fn fetch(&self, ctx: &TierContext) -> Result<Vec<Record>, TierError>;
}

/// Adapts an async closure into a [`TierFetcher`]
pub struct FnFetcher<F>(F);

#[async_trait]
impl<F, Fut> TierFetcher for FnFetcher<F>
where
    F: Fn(TierContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Record>, TierError>> + Send + 'static,
{
    async fn fetch(&self, ctx: &TierContext) -> Result<Vec<Record>, TierError> {
        (self.0)(ctx.clone()).await
    }
}

/// One fallback strategy of a source
#[derive(Clone)]
pub struct Tier {
    pub name: String,
    /// Lower values are tried first
    pub priority: u32,
    /// Network domain the tier talks to; keys its rate limiter and session
    pub domain: String,
    pub description: String,
    pub fetcher: Arc<dyn TierFetcher>,
}

impl Tier {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        fetcher: Arc<dyn TierFetcher>,
    ) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            domain: domain.into().to_lowercase(),
            description: String::new(),
            fetcher,
        }
    }

    /// Builds a tier from an async closure
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use shelf_sentry::orchestrator::{Tier, TierContext, TierError};
    ///
    /// let tier = Tier::from_fn("aggregator", "katalozi.bg", |_ctx: TierContext| async {
    ///     Ok::<_, TierError>(vec![json!({"name": "Кисело мляко", "price": 1.19})])
    /// })
    /// .with_priority(2);
    /// assert_eq!(tier.priority, 2);
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<String>, domain: impl Into<String>, f: F) -> Self
    where
        F: Fn(TierContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Record>, TierError>> + Send + 'static,
    {
        Self::new(name, domain, Arc::new(FnFetcher(f)))
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}
