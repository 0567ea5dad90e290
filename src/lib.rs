//! Shelf-Sentry: a resilient fetching core for uncooperative product sources
//!
//! This crate decides whether, when and how to call a rate-limited upstream,
//! presents a consistent browser identity per domain, falls back across
//! prioritized data-source tiers and serves stale cached results when every
//! live tier fails.

pub mod adapters;
pub mod cache;
pub mod circuit;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod ring;
pub mod session;
pub mod url;

use thiserror::Error;

/// Main error type for Shelf-Sentry operations
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Source already registered: {0}")]
    DuplicateSource(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Returned by blocking operations whose cancellation token fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Shelf-Sentry operations
pub type Result<T> = std::result::Result<T, SentryError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// An opaque record produced by a tier (one product, one offer, ...)
pub type Record = serde_json::Value;

// Re-export commonly used types
pub use circuit::{CircuitBreaker, CircuitOpenError, CircuitRegistry, CircuitState};
pub use config::Config;
pub use health::{HealthMonitor, HealthStatus};
pub use orchestrator::{FetchError, FetchResult, Orchestrator, SourceConfig, Tier};
pub use rate_limit::{AdaptiveRateLimiter, DomainRateLimiter};
pub use retry::{JitterStrategy, RetryConfig, RetryEngine, RetryError};
pub use session::{BrowserSession, SessionManager};
pub use url::{domain_from_str, extract_domain, sanitize_domain};
