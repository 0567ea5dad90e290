use crate::session::browser::{browser_headers, BrowserFamily};
use crate::session::cookies::jar_cookies;
use crate::session::{SessionConfig, SessionError};
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Serializable snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub browser: BrowserFamily,
    /// Shortened user agent
    pub user_agent: String,
    pub request_count: u32,
    pub error_count: u32,
    pub age_secs: u64,
    pub should_rotate: bool,
}

/// One browser identity and the HTTP client that speaks with it
///
/// The client sends the family's header set on every request and keeps
/// cookies in the session's own jar.
#[derive(Debug)]
pub struct BrowserSession {
    id: String,
    family: BrowserFamily,
    user_agent: &'static str,
    client: Client,
    jar: Arc<Jar>,
    cookie_url: Url,
    config: SessionConfig,
    created_at: Instant,
    request_count: AtomicU32,
    error_count: AtomicU32,
}

impl BrowserSession {
    pub(crate) fn new(
        id: String,
        family: BrowserFamily,
        user_agent: &'static str,
        cookie_url: Url,
        config: SessionConfig,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .default_headers(browser_headers(family, user_agent, None)?)
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            id,
            family,
            user_agent,
            client,
            jar,
            cookie_url,
            config,
            created_at: Instant::now(),
            request_count: AtomicU32::new(0),
            error_count: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> BrowserFamily {
        self.family
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }

    /// Client carrying this session's headers and cookies
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn jar(&self) -> &Jar {
        &self.jar
    }

    pub(crate) fn cookie_url(&self) -> &Url {
        &self.cookie_url
    }

    /// Counts one request made with this identity
    pub fn begin_request(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts an error response; rotation statuses exhaust the request budget
    pub fn record_error(&self, status: u16) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        if self.config.rotate_on_status.contains(&status) {
            self.request_count
                .fetch_max(self.config.max_requests, Ordering::SeqCst);
        }
    }

    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the request budget or the maximum age has been reached
    pub fn should_rotate(&self) -> bool {
        self.request_count() >= self.config.max_requests || self.age() >= self.config.max_age
    }

    /// Cookies currently held for the session's domain
    pub fn cookies(&self) -> BTreeMap<String, String> {
        jar_cookies(&self.jar, &self.cookie_url)
    }

    pub fn stats(&self) -> SessionStats {
        let user_agent = match self.user_agent.char_indices().nth(50) {
            Some((cut, _)) => format!("{}...", &self.user_agent[..cut]),
            None => self.user_agent.to_string(),
        };

        SessionStats {
            session_id: self.id.clone(),
            browser: self.family,
            user_agent,
            request_count: self.request_count(),
            error_count: self.error_count(),
            age_secs: self.age().as_secs(),
            should_rotate: self.should_rotate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookies::cookie_url;

    fn session(config: SessionConfig) -> BrowserSession {
        let family = BrowserFamily::FirefoxWindows;
        BrowserSession::new(
            "lidl.bg_1_0".to_string(),
            family,
            family.user_agents()[0],
            cookie_url("lidl.bg").unwrap(),
            config,
            Duration::from_secs(30),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_request_budget() {
        let s = session(SessionConfig {
            max_requests: 2,
            ..SessionConfig::default()
        });
        s.begin_request();
        assert!(!s.should_rotate());
        s.begin_request();
        assert!(s.should_rotate());
    }

    #[tokio::test]
    async fn test_rotation_status_forces_rotation() {
        let s = session(SessionConfig::default());
        s.record_error(404);
        assert!(!s.should_rotate());
        s.record_error(403);
        assert!(s.should_rotate());
        assert_eq!(s.error_count(), 2);
        assert_eq!(s.request_count(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_age() {
        let s = session(SessionConfig {
            max_age: Duration::from_secs(60),
            ..SessionConfig::default()
        });
        assert!(!s.should_rotate());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(s.should_rotate());
    }

    #[tokio::test]
    async fn test_stats_shorten_user_agent() {
        let s = session(SessionConfig::default());
        let stats = s.stats();
        assert_eq!(stats.session_id, "lidl.bg_1_0");
        assert!(stats.user_agent.ends_with("..."));
        assert_eq!(stats.user_agent.len(), 53);
        assert_eq!(stats.browser, BrowserFamily::FirefoxWindows);
    }
}
