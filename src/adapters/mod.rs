//! Tier adapters for sources declared in the configuration file
//!
//! A configured tier is a plain HTTP GET whose body is turned into records
//! either by CSS selectors (HTML pages) or by a JSON pointer (APIs). Sources
//! with anything more involved register their tiers programmatically.

mod html;
mod http;
mod json;

pub use html::extract as extract_html;
pub use http::{parse_retry_after, HttpTier};
pub use json::extract as extract_json;

use crate::config::{SourceEntry, TierEntry};
use crate::orchestrator::{SourceConfig, Tier};
use crate::url::domain_from_str;
use std::sync::Arc;

/// Builds an HTTP tier from its configuration entry
pub fn tier_from_entry(entry: &TierEntry) -> crate::Result<Tier> {
    let domain = domain_from_str(&entry.url)?;
    let fetcher = HttpTier::new(&entry.url, entry.extraction.clone());

    Ok(Tier::new(&entry.name, domain, Arc::new(fetcher))
        .with_priority(entry.priority)
        .with_description(format!("GET {}", entry.url)))
}

/// Builds a source and all of its tiers from a configuration entry
pub fn source_from_entry(entry: &SourceEntry) -> crate::Result<SourceConfig> {
    let mut source = SourceConfig::new(&entry.id, &entry.display_name)
        .with_min_products(entry.min_products as usize)
        .with_circuit(
            entry.circuit_failure_threshold,
            entry.circuit_recovery_timeout,
        );
    source.expected_products = entry.expected_products;

    for tier in &entry.tiers {
        source = source.with_tier(tier_from_entry(tier)?);
    }
    Ok(source)
}
