use crate::config::RateLimitSettings;
use crate::rate_limit::{AdaptiveRateLimiter, RateLimitConfig, RateLimiterStats};
use crate::url::domain_from_str;
use crate::Cancelled;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Registry of adaptive limiters, one per domain
///
/// Limiters are created on first use from the domain's override, or from the
/// default configuration when the domain has none. Different domains never
/// contend on the same lock.
#[derive(Debug)]
pub struct DomainRateLimiter {
    default: RateLimitConfig,
    overrides: HashMap<String, RateLimitConfig>,
    limiters: DashMap<String, Arc<AdaptiveRateLimiter>>,
}

impl DomainRateLimiter {
    pub fn new(default: RateLimitConfig) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            limiters: DashMap::new(),
        }
    }

    /// Builds a registry from the `[rate-limit]` section of the configuration
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        settings.domains.iter().fold(
            Self::new(settings.default.clone()),
            |limiter, entry| limiter.with_override(&entry.domain, entry.limits.clone()),
        )
    }

    /// Uses `config` for `domain` instead of the default
    pub fn with_override(mut self, domain: &str, config: RateLimitConfig) -> Self {
        self.overrides.insert(domain.to_lowercase(), config);
        self
    }

    /// Returns the limiter for a domain, creating it on first use
    pub fn limiter(&self, domain: &str) -> Arc<AdaptiveRateLimiter> {
        let domain = domain.to_lowercase();
        if let Some(existing) = self.limiters.get(&domain) {
            return existing.value().clone();
        }

        self.limiters
            .entry(domain.clone())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(&domain)
                    .cloned()
                    .unwrap_or_else(|| self.default.clone());
                tracing::debug!(
                    "Created rate limiter for {} ({:.2}s initial delay)",
                    domain,
                    config.initial_delay().as_secs_f64()
                );
                Arc::new(AdaptiveRateLimiter::from_config(config))
            })
            .value()
            .clone()
    }

    /// Waits for the limiter of the URL's domain
    pub async fn wait(&self, url: &str, cancel: &CancellationToken) -> crate::Result<Duration> {
        let domain = domain_from_str(url)?;
        Ok(self.wait_domain(&domain, cancel).await?)
    }

    pub async fn wait_domain(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Duration, Cancelled> {
        // Clone the Arc so no map shard is held across the sleep
        let limiter = self.limiter(domain);
        limiter.wait(cancel).await
    }

    pub fn report_success(&self, domain: &str) {
        self.limiter(domain).report_success();
    }

    pub fn report_failure(&self, domain: &str, status: Option<u16>) {
        self.limiter(domain).report_failure(status);
    }

    pub fn reset(&self, domain: &str) {
        if let Some(limiter) = self.limiters.get(&domain.to_lowercase()) {
            limiter.reset();
        }
    }

    /// Stats for one domain, if a limiter exists for it
    pub fn stats_for(&self, domain: &str) -> Option<RateLimiterStats> {
        self.limiters
            .get(&domain.to_lowercase())
            .map(|limiter| limiter.stats())
    }

    /// Stats for every domain seen so far, ordered by domain
    pub fn stats(&self) -> BTreeMap<String, RateLimiterStats> {
        self.limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
