use crate::orchestrator::Tier;
use std::time::Duration;

/// Everything the orchestrator needs to know about one source
///
/// # Example
///
/// ```
/// use shelf_sentry::orchestrator::{SourceConfig, Tier, TierError};
///
/// let source = SourceConfig::new("lidl", "Lidl")
///     .with_min_products(200)
///     .with_tier(Tier::from_fn("direct", "lidl.bg", |_ctx| async {
///         Ok::<_, TierError>(Vec::new())
///     }));
/// assert_eq!(source.min_required(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub tiers: Vec<Tier>,

    /// A tier result is accepted only with at least half this many records
    pub min_products: usize,

    /// Baseline for the health monitor's product ratio
    pub expected_products: Option<u64>,

    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout: Duration,
}

impl SourceConfig {
    pub fn new(source_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            tiers: Vec::new(),
            min_products: 50,
            expected_products: None,
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn with_min_products(mut self, min_products: usize) -> Self {
        self.min_products = min_products;
        self
    }

    pub fn with_expected_products(mut self, expected: u64) -> Self {
        self.expected_products = Some(expected);
        self
    }

    pub fn with_circuit(mut self, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        self.circuit_failure_threshold = failure_threshold;
        self.circuit_recovery_timeout = recovery_timeout;
        self
    }

    /// Smallest record count a tier result must reach (half of `min_products`, rounded up)
    pub fn min_required(&self) -> usize {
        self.min_products.div_ceil(2)
    }

    /// Whether a tier result with `count` records is usable
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_required()
    }

    /// Tiers ordered by priority; ties keep their declaration order
    pub(crate) fn sorted_tiers(&self) -> Vec<Tier> {
        let mut tiers = self.tiers.clone();
        tiers.sort_by_key(|t| t.priority);
        tiers
    }
}
