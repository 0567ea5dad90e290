//! Tiered fetching with circuit, retry, rate limit and session composition
//!
//! # Components
//!
//! - `Tier` / `TierFetcher`: one way of obtaining a source's records
//! - `TierExecutor`: runs one tier through circuit → retry → rate limit → session
//! - `SourceConfig`: a source and its ordered tiers
//! - `Orchestrator`: registers sources, falls back across tiers and to the cache
//! - `FetchResult` / `FetchError`: what callers get back

mod coordinator;
mod executor;
mod result;
mod source;
mod tier;

pub use coordinator::{Orchestrator, OrchestratorConfig, SystemReport};
pub use executor::TierExecutor;
pub use result::{FailureKind, FetchError, FetchOrigin, FetchResult, TierFailure};
pub use source::SourceConfig;
pub use tier::{FnFetcher, Tier, TierContext, TierError, TierFetcher};
