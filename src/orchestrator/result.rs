use crate::circuit::CircuitOpenError;
use crate::orchestrator::TierError;
use crate::retry::{Classify, ErrorKind};
use crate::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Where the records of a [`FetchResult`] came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum FetchOrigin {
    /// A tier answered in this call
    Live {
        /// One-based position of the tier in priority order
        tier_index: usize,
        tier_name: String,
        elapsed: Duration,
    },
    /// Every live tier failed; these are the last known good records
    Cached {
        cached_at: DateTime<Utc>,
        age: Duration,
    },
}

/// Records obtained for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub source_id: String,
    pub records: Vec<Record>,
    pub origin: FetchOrigin,
}

impl FetchResult {
    pub fn from_cache(&self) -> bool {
        matches!(self.origin, FetchOrigin::Cached { .. })
    }

    /// Age of stale records in hours; `None` for live results
    pub fn cache_age_hours(&self) -> Option<f64> {
        match &self.origin {
            FetchOrigin::Cached { age, .. } => Some(age.as_secs_f64() / 3600.0),
            FetchOrigin::Live { .. } => None,
        }
    }

    pub fn product_count(&self) -> usize {
        self.records.len()
    }

    /// One-based index of the tier that answered; `None` for cached results
    pub fn tier_index(&self) -> Option<usize> {
        match &self.origin {
            FetchOrigin::Live { tier_index, .. } => Some(*tier_index),
            FetchOrigin::Cached { .. } => None,
        }
    }

    /// Name of the answering tier, or "cache"
    pub fn tier_name(&self) -> &str {
        match &self.origin {
            FetchOrigin::Live { tier_name, .. } => tier_name,
            FetchOrigin::Cached { .. } => "cache",
        }
    }
}

/// The only errors a `fetch_source` caller ever sees
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("All tiers failed for '{source_id}' and no cache is available")]
    TotalFailure { source_id: String },

    #[error("Fetch cancelled")]
    Cancelled,
}

/// Coarse category of a failure, for logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, connection problem or 5xx; worth retrying
    Transient,
    /// HTTP 429
    RateLimited,
    /// The source's circuit rejected the call
    CircuitOpen,
    /// The tier answered with too few records
    Validation,
    /// Retries ran out
    Exhausted,
    /// An error retrying cannot fix
    Fatal,
    Cancelled,
}

impl FailureKind {
    /// Category of a single attempt error
    pub fn of(error: &TierError) -> Self {
        match error.kind() {
            ErrorKind::Status(429) => Self::RateLimited,
            ErrorKind::Timeout | ErrorKind::Connection => Self::Transient,
            ErrorKind::Status(code) if code >= 500 => Self::Transient,
            ErrorKind::Cancelled => Self::Cancelled,
            _ => Self::Fatal,
        }
    }
}

/// Why one tier produced no usable records
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TierFailure {
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("returned only {got} records (expected >= {required})")]
    Validation { got: usize, required: usize },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TierError },

    #[error("{0}")]
    Fatal(TierError),

    #[error("cancelled")]
    Cancelled,
}

impl TierFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CircuitOpen(_) => FailureKind::CircuitOpen,
            Self::Validation { .. } => FailureKind::Validation,
            Self::Exhausted { .. } => FailureKind::Exhausted,
            Self::Fatal(_) => FailureKind::Fatal,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}
