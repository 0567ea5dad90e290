use crate::circuit::CircuitBreakerConfig;
use crate::config::deserialize_secs;
use crate::health::HealthThresholds;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;
use crate::session::SessionConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Shelf-Sentry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub circuit: CircuitBreakerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
}

/// Where persisted state lives
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PathsConfig {
    /// Root data directory; caches and cookies live underneath it
    pub data_dir: PathBuf,
}

impl PathsConfig {
    /// Directory holding one cache file per source
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Directory holding one cookie file per domain
    pub fn cookie_dir(&self) -> PathBuf {
        self.data_dir.join("cookies")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Network timeouts applied to every outgoing call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NetworkConfig {
    /// Hard deadline for a single tier attempt (seconds)
    #[serde(deserialize_with = "deserialize_secs")]
    pub timeout: Duration,

    /// TCP/TLS connect timeout (seconds)
    #[serde(deserialize_with = "deserialize_secs")]
    pub connect_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Rate limiting defaults plus per-domain overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitSettings {
    /// Applied to every domain without an override
    #[serde(default)]
    pub default: RateLimitConfig,

    #[serde(default, rename = "domain")]
    pub domains: Vec<DomainRateEntry>,
}

/// A rate limit override for one domain
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRateEntry {
    /// Host name, e.g. "kaufland.bg"
    pub domain: String,

    #[serde(flatten)]
    pub limits: RateLimitConfig,
}

/// Health monitoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HealthConfig {
    /// Number of recent outcomes used for the error rate
    pub outcome_window: usize,

    /// Number of recent response times used for the average
    pub response_window: usize,

    /// Minimum time between two alerts for the same (source, status) pair
    #[serde(deserialize_with = "deserialize_secs")]
    pub alert_cooldown: Duration,

    /// Baseline record count for sources that don't declare one
    pub default_expected_products: u64,

    pub thresholds: HealthThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            outcome_window: 20,
            response_window: 50,
            alert_cooldown: Duration::from_secs(300),
            default_expected_products: 100,
            thresholds: HealthThresholds::default(),
        }
    }
}

/// A data source declared in the configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceEntry {
    /// Unique identifier (also the cache file key)
    pub id: String,

    /// Human-readable name used in logs and reports
    pub display_name: String,

    /// Minimum acceptable record count; a tier needs at least half of it
    #[serde(default = "default_min_products")]
    pub min_products: u64,

    /// Expected record count used for health ratios
    #[serde(default)]
    pub expected_products: Option<u64>,

    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    #[serde(
        default = "default_circuit_recovery_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub circuit_recovery_timeout: Duration,

    #[serde(default, rename = "tier")]
    pub tiers: Vec<TierEntry>,
}

fn default_min_products() -> u64 {
    50
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_recovery_timeout() -> Duration {
    Duration::from_secs(300)
}

/// One fallback tier of a configured source
#[derive(Debug, Clone, Deserialize)]
pub struct TierEntry {
    /// Tier name, e.g. "direct" or "aggregator"
    pub name: String,

    /// Lower values are tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Page or API endpoint to fetch
    pub url: String,

    #[serde(flatten)]
    pub extraction: ExtractionConfig,
}

fn default_priority() -> u32 {
    1
}

/// How records are pulled out of a tier's response body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractionConfig {
    /// One record per element matched by `selector`
    Html {
        selector: String,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },

    /// One record per element of the array at `pointer`
    Json {
        #[serde(default)]
        pointer: String,
    },
}
