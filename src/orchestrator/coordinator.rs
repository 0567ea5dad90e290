//! Orchestrator - per-source tier fallback with stale-cache degradation
//!
//! The orchestrator owns every shared component (rate limiters, sessions,
//! circuits, health metrics and the result cache) and composes them around
//! each source's tiers:
//! - An open circuit sends the source straight to its cache
//! - Tiers are tried in priority order until one returns enough records
//! - A successful tier refreshes the cache and stops the fallback
//! - When every tier fails, the last cached result is returned with its age

use crate::adapters::source_from_entry;
use crate::cache::ResultCache;
use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitRegistry, CircuitStats};
use crate::config::{validate, Config, HealthConfig, NetworkConfig, PathsConfig, RateLimitSettings};
use crate::health::{AlertSink, HealthMonitor, HealthReport};
use crate::orchestrator::{
    FetchError, FetchOrigin, FetchResult, SourceConfig, TierExecutor, TierFailure,
};
use crate::rate_limit::{DomainRateLimiter, RateLimiterStats};
use crate::retry::{RetryConfig, RetryEngine};
use crate::session::{SessionConfig, SessionManager, SessionStats};
use crate::SentryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Settings shared by every source of an orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub paths: PathsConfig,
    pub network: NetworkConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitSettings,
    /// Defaults for circuits; each source overrides threshold and recovery
    pub circuit: CircuitBreakerConfig,
    pub session: SessionConfig,
    pub health: HealthConfig,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            network: config.network.clone(),
            retry: config.retry.clone(),
            rate_limit: config.rate_limit.clone(),
            circuit: config.circuit.clone(),
            session: config.session.clone(),
            health: config.health.clone(),
        }
    }
}

/// Everything reported by [`Orchestrator::health_report`]
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub generated_at: DateTime<Utc>,
    pub sources: BTreeMap<String, HealthReport>,
    pub rate_limiters: BTreeMap<String, RateLimiterStats>,
    pub circuits: BTreeMap<String, CircuitStats>,
    pub sessions: BTreeMap<String, SessionStats>,
}

#[derive(Debug)]
struct RegisteredSource {
    config: SourceConfig,
    circuit: Arc<CircuitBreaker>,
    /// One per tier, in priority order
    executors: Vec<TierExecutor>,
}

/// Fetches sources through their tiers, degrading to cached results
pub struct Orchestrator {
    config: OrchestratorConfig,
    rate_limiter: Arc<DomainRateLimiter>,
    sessions: Arc<SessionManager>,
    circuits: CircuitRegistry,
    health: Arc<HealthMonitor>,
    cache: ResultCache,
    sources: RwLock<BTreeMap<String, Arc<RegisteredSource>>>,
}

impl Orchestrator {
    /// Creates an orchestrator with no sources
    pub fn new(config: OrchestratorConfig) -> Self {
        let rate_limiter = DomainRateLimiter::from_settings(&config.rate_limit);
        let sessions = SessionManager::new(config.paths.cookie_dir(), config.session.clone())
            .with_timeouts(config.network.timeout, config.network.connect_timeout);

        Self {
            rate_limiter: Arc::new(rate_limiter),
            sessions: Arc::new(sessions),
            circuits: CircuitRegistry::new(config.circuit.clone()),
            health: Arc::new(HealthMonitor::new(config.health.clone())),
            cache: ResultCache::new(config.paths.cache_dir()),
            sources: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Creates an orchestrator and registers every source declared in `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - All sources registered
    /// * `Err(SentryError)` - The config is invalid, or a source has an
    ///   unusable tier or a duplicate id
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        validate(config)?;
        let orchestrator = Self::new(OrchestratorConfig::from(config));
        for entry in &config.sources {
            orchestrator.register_source(source_from_entry(entry)?)?;
        }
        Ok(orchestrator)
    }

    /// Sends health alerts to `sink` in addition to the log
    pub fn with_alert_sink(self, sink: Arc<dyn AlertSink>) -> Self {
        self.health.set_alert_sink(sink);
        self
    }

    /// Adds a source and creates its circuit breaker
    pub fn register_source(&self, source: SourceConfig) -> crate::Result<()> {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        if sources.contains_key(&source.source_id) {
            return Err(SentryError::DuplicateSource(source.source_id));
        }

        let circuit = self.circuits.insert(
            &source.source_id,
            CircuitBreakerConfig {
                failure_threshold: source.circuit_failure_threshold,
                recovery_timeout: source.circuit_recovery_timeout,
                ..self.config.circuit.clone()
            },
        );

        if let Some(expected) = source.expected_products {
            self.health.set_expected(&source.source_id, expected);
        }

        let retry = RetryEngine::new(self.config.retry.clone());
        let executors = source
            .sorted_tiers()
            .into_iter()
            .enumerate()
            .map(|(i, tier)| {
                TierExecutor::new(
                    &source.source_id,
                    i + 1,
                    tier,
                    circuit.clone(),
                    retry.clone(),
                    self.rate_limiter.clone(),
                    self.sessions.clone(),
                    self.config.network.timeout,
                )
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Registered source {} ({}) with {} tiers",
            source.source_id,
            source.display_name,
            executors.len()
        );

        sources.insert(
            source.source_id.clone(),
            Arc::new(RegisteredSource {
                config: source,
                circuit,
                executors,
            }),
        );
        Ok(())
    }

    /// Ids of all registered sources, sorted
    pub fn source_ids(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.keys().cloned().collect()
    }

    fn registered(&self, source_id: &str) -> Option<Arc<RegisteredSource>> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.get(source_id).cloned()
    }

    /// Fetches the records of one source
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - Live records, or cached records when every tier failed
    /// * `Err(FetchError::TotalFailure)` - Every tier failed and nothing is cached
    /// * `Err(FetchError::UnknownSource)` - `source_id` was never registered
    /// * `Err(FetchError::Cancelled)` - `cancel` fired; nothing was recorded
    pub async fn fetch_source(
        &self,
        source_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let source = self
            .registered(source_id)
            .ok_or_else(|| FetchError::UnknownSource(source_id.to_string()))?;

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        if source.circuit.is_open() {
            tracing::warn!("[{}] Circuit open, using cached data", source_id);
            return self.fallback(source_id).await;
        }

        for executor in &source.executors {
            let tier = executor.tier();
            tracing::info!(
                "[{}] Trying tier {}: {} ({})",
                source_id,
                executor.index(),
                tier.name,
                tier.domain
            );

            let started = Instant::now();
            let failure = match executor.run(cancel).await {
                Ok(records) if source.config.accepts(records.len()) => {
                    let elapsed = started.elapsed();
                    self.health.record_success(
                        source_id,
                        elapsed,
                        records.len() as u64,
                        executor.index(),
                    );

                    if let Err(e) = self.cache.store(source_id, &records).await {
                        tracing::warn!("[{}] Failed to cache result: {}", source_id, e);
                    }

                    tracing::info!(
                        "[{}] Tier {} returned {} records in {:.2}s",
                        source_id,
                        executor.index(),
                        records.len(),
                        elapsed.as_secs_f64()
                    );

                    return Ok(FetchResult {
                        source_id: source_id.to_string(),
                        records,
                        origin: FetchOrigin::Live {
                            tier_index: executor.index(),
                            tier_name: tier.name.clone(),
                            elapsed,
                        },
                    });
                }
                Ok(records) => TierFailure::Validation {
                    got: records.len(),
                    required: source.config.min_required(),
                },
                Err(TierFailure::Cancelled) => {
                    tracing::info!("[{}] Fetch cancelled", source_id);
                    return Err(FetchError::Cancelled);
                }
                Err(TierFailure::CircuitOpen(e)) => {
                    tracing::warn!("[{}] {}", source_id, e);
                    break;
                }
                Err(failure) => failure,
            };

            tracing::warn!(
                "[{}] Tier {} ({}) failed: {}",
                source_id,
                executor.index(),
                tier.name,
                failure
            );
            self.health
                .record_failure(source_id, &failure.to_string(), executor.index());
        }

        tracing::error!("[{}] All tiers failed", source_id);
        self.fallback(source_id).await
    }

    /// Serves the cached result of a source, or reports total failure
    async fn fallback(&self, source_id: &str) -> Result<FetchResult, FetchError> {
        let cached = match self.cache.load(source_id).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("[{}] Failed to read cache: {}", source_id, e);
                None
            }
        };

        match cached {
            Some(cached) => {
                let age = cached.age();
                tracing::warn!(
                    "[{}] Using cached data ({} records, {:.1}h old)",
                    source_id,
                    cached.product_count,
                    cached.age_hours()
                );
                Ok(FetchResult {
                    source_id: source_id.to_string(),
                    records: cached.products.clone(),
                    origin: FetchOrigin::Cached {
                        cached_at: cached.cached_at,
                        age,
                    },
                })
            }
            None => {
                tracing::error!("[{}] No cached data available", source_id);
                Err(FetchError::TotalFailure {
                    source_id: source_id.to_string(),
                })
            }
        }
    }

    /// Fetches every registered source concurrently, one task per source
    pub async fn scrape_all(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, Result<FetchResult, FetchError>> {
        let mut tasks = JoinSet::new();
        for source_id in self.source_ids() {
            let orchestrator = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = orchestrator.fetch_source(&source_id, &cancel).await;
                (source_id, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source_id, result)) => {
                    results.insert(source_id, result);
                }
                Err(e) => tracing::error!("Source task failed: {}", e),
            }
        }

        let live = results
            .values()
            .filter(|r| matches!(r, Ok(res) if !res.from_cache()))
            .count();
        let cached = results
            .values()
            .filter(|r| matches!(r, Ok(res) if res.from_cache()))
            .count();
        tracing::info!(
            "Scrape finished: {} live, {} from cache, {} failed",
            live,
            cached,
            results.len() - live - cached
        );

        results
    }

    /// Snapshot of every component, for dashboards and the CLI
    pub fn health_report(&self) -> SystemReport {
        SystemReport {
            generated_at: Utc::now(),
            sources: self.health.report(),
            rate_limiters: self.rate_limiter.stats(),
            circuits: self.circuits.stats_all(),
            sessions: self.sessions.stats(),
        }
    }

    pub fn health_summary(&self) -> String {
        self.health.summary()
    }

    /// Forces a source's circuit closed
    ///
    /// # Returns
    ///
    /// `false` if no circuit exists for `source_id`
    pub fn reset_circuit(&self, source_id: &str) -> bool {
        self.circuits.reset(source_id)
    }

    pub fn reset_all_circuits(&self) {
        self.circuits.reset_all();
    }

    /// Persists the cookie jars of all current sessions
    pub fn save_cookies(&self) -> usize {
        self.sessions.save_all_cookies()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn rate_limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.rate_limiter
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("sources", &self.source_ids())
            .field("data_dir", &self.config.paths.data_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{Tier, TierError};
    use crate::Record;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> Orchestrator {
        let mut config = OrchestratorConfig::default();
        config.paths.data_dir = dir.path().to_path_buf();
        config.rate_limit.default.min_delay = Duration::from_millis(10);
        config.rate_limit.default.requests_per_minute = 600.0;
        config.retry.max_attempts = 1;
        Orchestrator::new(config)
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| json!({"id": i})).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_source_rejected() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        orch.register_source(SourceConfig::new("billa", "Billa")).unwrap();

        let err = orch
            .register_source(SourceConfig::new("billa", "Billa again"))
            .unwrap_err();
        assert!(matches!(err, SentryError::DuplicateSource(id) if id == "billa"));
        assert_eq!(orch.source_ids(), vec!["billa"]);
        assert!(orch.circuits().get("billa").is_some());
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;

        let err = Orchestrator::from_config(&config).unwrap_err();
        assert!(matches!(err, SentryError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_source() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let err = orch
            .fetch_source("nope", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::UnknownSource("nope".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_qualifying_tier_wins_and_is_cached() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        orch.register_source(
            SourceConfig::new("lidl", "Lidl")
                .with_min_products(10)
                .with_tier(
                    Tier::from_fn("fallback", "katalozi.bg", |_ctx| async {
                        Ok::<_, TierError>(records(50))
                    })
                    .with_priority(2),
                )
                .with_tier(Tier::from_fn("direct", "lidl.bg", |_ctx| async {
                    Ok::<_, TierError>(records(8))
                })),
        )
        .unwrap();

        let result = orch
            .fetch_source("lidl", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.tier_name(), "direct");
        assert_eq!(result.tier_index(), Some(1));
        assert_eq!(result.product_count(), 8);

        let cached = orch.cache().load("lidl").await.unwrap().unwrap();
        assert_eq!(cached.product_count, 8);

        let report = orch.health_report();
        assert_eq!(report.sources["lidl"].successful_requests, 1);
        assert!(report.circuits.contains_key("lidl"));
    }
}
