//! Browser sessions with consistent identities per domain
//!
//! Each domain gets one current `BrowserSession`: a browser family, a user
//! agent from that family, the header set that browser would send and a cookie
//! jar. Sessions rotate after a request budget, after a maximum age, or as soon
//! as the upstream answers with a status that suggests we've been noticed.
//!
//! # Components
//!
//! - `browser`: user agent pools, family weighting and header sets
//! - `BrowserSession`: one identity and the HTTP client bound to it
//! - `SessionManager`: per-domain current sessions and rotation
//! - `CookieStore`: JSON cookie files, one per domain

mod browser;
mod cookies;
mod manager;
mod session;

pub use browser::{browser_headers, chrome_major_version, BrowserFamily};
pub use cookies::CookieStore;
pub use manager::SessionManager;
pub use session::{BrowserSession, SessionStats};

use crate::config::deserialize_secs;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Session rotation and persistence settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    /// Requests served by one session before it is replaced
    pub max_requests: u32,

    /// Lifetime of one session (seconds)
    #[serde(deserialize_with = "deserialize_secs")]
    pub max_age: Duration,

    /// Statuses that retire the current session immediately
    pub rotate_on_status: Vec<u16>,

    /// Save cookie jars on rotation and restore them for new sessions
    pub cookie_persistence: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            max_age: Duration::from_secs(1800),
            rotate_on_status: vec![403, 429, 503],
            cookie_persistence: true,
        }
    }
}

/// Errors raised while creating sessions or persisting their cookies
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Cookie file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cookie file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header value for {name}: {value}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("Invalid domain for cookies: {0}")]
    InvalidDomain(String),
}
