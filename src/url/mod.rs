//! URL handling module for Shelf-Sentry
//!
//! Every piece of per-domain state (rate limiter, browser session, cookie file)
//! is keyed by the lowercase host of the URL a tier talks to. This module owns
//! that extraction and the mapping from a domain to a safe file name.

mod domain;

// Re-export main functions
pub use domain::{domain_from_str, extract_domain, sanitize_domain};
