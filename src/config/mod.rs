//! Configuration module for Shelf-Sentry
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional and falls back to the defaults of the component it
//! configures, so a file only needs its `[[source]]` entries.
//!
//! # Example
//!
//! ```no_run
//! use shelf_sentry::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sentry.toml")).unwrap();
//! println!("Retry attempts per tier: {}", config.retry.max_attempts);
//! ```

mod duration;
mod parser;
mod types;
mod validation;

pub(crate) use duration::deserialize_secs;

// Re-export types
pub use types::{
    Config, ExtractionConfig, HealthConfig, NetworkConfig, PathsConfig, RateLimitSettings,
    DomainRateEntry, SourceEntry, TierEntry,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
