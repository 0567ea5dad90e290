use crate::circuit::CircuitBreakerConfig;
use crate::config::types::{Config, ExtractionConfig, HealthConfig, NetworkConfig, SourceEntry};
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;
use crate::session::SessionConfig;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_network_config(&config.network)?;
    validate_retry_config(&config.retry)?;
    validate_rate_limit_config("default", &config.rate_limit.default)?;
    for entry in &config.rate_limit.domains {
        if entry.domain.is_empty() {
            return Err(ConfigError::Validation(
                "rate-limit domain cannot be empty".to_string(),
            ));
        }
        validate_rate_limit_config(&entry.domain, &entry.limits)?;
    }
    validate_circuit_config(&config.circuit)?;
    validate_session_config(&config.session)?;
    validate_health_config(&config.health)?;
    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_network_config(config: &NetworkConfig) -> Result<(), ConfigError> {
    if config.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "network timeout must be greater than zero".to_string(),
        ));
    }

    if config.connect_timeout > config.timeout {
        return Err(ConfigError::Validation(format!(
            "connect-timeout ({:?}) cannot exceed timeout ({:?})",
            config.connect_timeout, config.timeout
        )));
    }

    Ok(())
}

/// Validates retry configuration
pub(crate) fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "retry base-delay ({:?}) cannot exceed max-delay ({:?})",
            config.base_delay, config.max_delay
        )));
    }

    if !config.exponential_base.is_finite() || config.exponential_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "exponential-base must be >= 1.0, got {}",
            config.exponential_base
        )));
    }

    Ok(())
}

/// Validates a rate limit configuration (default or domain override)
pub(crate) fn validate_rate_limit_config(
    name: &str,
    config: &RateLimitConfig,
) -> Result<(), ConfigError> {
    if !config.requests_per_minute.is_finite() || config.requests_per_minute <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "[{}] requests-per-minute must be > 0, got {}",
            name, config.requests_per_minute
        )));
    }

    if config.min_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "[{}] min-delay ({:?}) cannot exceed max-delay ({:?})",
            name, config.min_delay, config.max_delay
        )));
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "[{}] backoff-multiplier must be >= 1.0, got {}",
            name, config.backoff_multiplier
        )));
    }

    if !(config.recovery_factor > 0.0 && config.recovery_factor <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "[{}] recovery-factor must be in (0, 1], got {}",
            name, config.recovery_factor
        )));
    }

    if config.success_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "[{}] success-threshold must be >= 1",
            name
        )));
    }

    Ok(())
}

/// Validates circuit breaker thresholds
pub(crate) fn validate_circuit_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "circuit failure-threshold must be >= 1".to_string(),
        ));
    }

    if config.success_threshold < 1 {
        return Err(ConfigError::Validation(
            "circuit success-threshold must be >= 1".to_string(),
        ));
    }

    // Otherwise a half-open circuit could never close
    if config.success_threshold > config.half_open_max_calls {
        return Err(ConfigError::Validation(format!(
            "circuit success-threshold ({}) cannot exceed half-open-max-calls ({})",
            config.success_threshold, config.half_open_max_calls
        )));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.max_requests < 1 {
        return Err(ConfigError::Validation(
            "session max-requests must be >= 1".to_string(),
        ));
    }

    if config.max_age.is_zero() {
        return Err(ConfigError::Validation(
            "session max-age must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_health_config(config: &HealthConfig) -> Result<(), ConfigError> {
    if config.outcome_window < 1 || config.response_window < 1 {
        return Err(ConfigError::Validation(
            "health windows must hold at least one entry".to_string(),
        ));
    }

    let t = &config.thresholds;
    let ordered = t.degraded_error_rate <= t.unhealthy_error_rate
        && t.unhealthy_error_rate <= t.critical_error_rate
        && t.degraded_response_time <= t.unhealthy_response_time
        && t.unhealthy_response_time <= t.critical_response_time
        && t.degraded_product_ratio >= t.unhealthy_product_ratio
        && t.unhealthy_product_ratio >= t.critical_product_ratio
        && t.degraded_consecutive_failures <= t.unhealthy_consecutive_failures
        && t.unhealthy_consecutive_failures <= t.critical_consecutive_failures;

    if !ordered {
        return Err(ConfigError::Validation(
            "health thresholds must grow in severity from degraded to critical".to_string(),
        ));
    }

    Ok(())
}

/// Validates source entries and their tiers
fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        if source.id.is_empty() {
            return Err(ConfigError::Validation(
                "source id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(source.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }

        if source.tiers.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' must declare at least one tier",
                source.id
            )));
        }

        if source.circuit_failure_threshold < 1 {
            return Err(ConfigError::Validation(format!(
                "source '{}' circuit-failure-threshold must be >= 1",
                source.id
            )));
        }

        for tier in &source.tiers {
            crate::url::domain_from_str(&tier.url).map_err(|e| {
                ConfigError::InvalidUrl(format!(
                    "tier '{}' of source '{}': {}",
                    tier.name, source.id, e
                ))
            })?;

            validate_extraction(&source.id, &tier.name, &tier.extraction)?;
        }
    }

    Ok(())
}

fn validate_extraction(
    source_id: &str,
    tier_name: &str,
    extraction: &ExtractionConfig,
) -> Result<(), ConfigError> {
    match extraction {
        ExtractionConfig::Html { selector, fields } => {
            let all = std::iter::once(selector).chain(fields.values());
            for css in all {
                if css.trim().is_empty() || Selector::parse(css).is_err() {
                    return Err(ConfigError::InvalidSelector(format!(
                        "'{}' in tier '{}' of source '{}'",
                        css, tier_name, source_id
                    )));
                }
            }
        }
        ExtractionConfig::Json { pointer } => {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "JSON pointer '{}' in tier '{}' of source '{}' must start with '/'",
                    pointer, tier_name, source_id
                )));
            }
        }
    }

    Ok(())
}
