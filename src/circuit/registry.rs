use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitStats};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named circuit breakers created on first use
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    default: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitRegistry {
    /// Creates a registry whose lazily created breakers use `default`
    pub fn new(default: CircuitBreakerConfig) -> Self {
        Self {
            default,
            breakers: DashMap::new(),
        }
    }

    /// Returns the breaker called `name`, creating it with the default config
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.default.clone())))
            .value()
            .clone()
    }

    /// Registers a breaker with its own thresholds, replacing any previous one
    pub fn insert(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        self.breakers.insert(name.to_string(), breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.value().clone())
    }

    /// Resets one breaker; returns false if no breaker has that name
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let all: Vec<_> = self.breakers.iter().map(|e| e.value().clone()).collect();
        for breaker in all {
            breaker.reset();
        }
    }

    pub fn stats_all(&self) -> BTreeMap<String, CircuitStats> {
        let all: Vec<_> = self.breakers.iter().map(|e| e.value().clone()).collect();
        all.into_iter()
            .map(|b| (b.name().to_string(), b.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = CircuitRegistry::default();
        let a = registry.get_or_create("lidl");
        let b = registry.get_or_create("lidl");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.config().failure_threshold, 5);
    }

    #[test]
    fn test_insert_uses_custom_config() {
        let registry = CircuitRegistry::default();
        registry.insert(
            "metro",
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(10),
                ..CircuitBreakerConfig::default()
            },
        );
        let metro = registry.get("metro").unwrap();
        assert_eq!(metro.config().failure_threshold, 2);
        assert!(registry.get("billa").is_none());
    }

    #[test]
    fn test_reset_all_and_stats() {
        let registry = CircuitRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        registry.get_or_create("a").record_failure();
        registry.get_or_create("b").record_failure();

        let stats = registry.stats_all();
        assert_eq!(stats.len(), 2);
        assert!(stats.values().all(|s| s.state == CircuitState::Open));

        registry.reset_all();
        assert!(registry
            .stats_all()
            .values()
            .all(|s| s.state == CircuitState::Closed));

        assert!(registry.reset("a"));
        assert!(!registry.reset("missing"));
    }
}
