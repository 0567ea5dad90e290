use crate::session::browser::BrowserFamily;
use crate::session::cookies::{cookie_url, fill_jar};
use crate::session::{BrowserSession, CookieStore, SessionConfig, SessionError, SessionStats};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Slot holding the current session of one domain
type SessionSlot = Arc<Mutex<Option<Arc<BrowserSession>>>>;

/// Hands out one current browser session per domain and rotates it
///
/// Each domain has its own slot lock, so rotating one domain never blocks
/// requests to another. A rotated-out session stays usable by whoever still
/// holds it; only new callers get the replacement.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    cookies: Option<CookieStore>,
    timeout: Duration,
    connect_timeout: Duration,
    slots: DashMap<String, SessionSlot>,
    counter: AtomicU64,
}

impl SessionManager {
    /// Creates a manager persisting cookies under `cookie_dir`
    ///
    /// When `config.cookie_persistence` is false, nothing is read from or
    /// written to `cookie_dir`.
    pub fn new(cookie_dir: impl Into<PathBuf>, config: SessionConfig) -> Self {
        let cookies = config
            .cookie_persistence
            .then(|| CookieStore::new(cookie_dir));

        Self {
            config,
            cookies,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            slots: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Sets the timeouts of the HTTP clients created from now on
    pub fn with_timeouts(mut self, timeout: Duration, connect_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn slot(&self, domain: &str) -> SessionSlot {
        if let Some(slot) = self.slots.get(domain) {
            return slot.value().clone();
        }
        self.slots
            .entry(domain.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Returns the current session of a domain, replacing it first if it is
    /// over budget, too old or absent
    pub fn get_session(&self, domain: &str) -> Result<Arc<BrowserSession>, SessionError> {
        let slot = self.slot(domain);
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(session) = current.as_ref() {
            if !session.should_rotate() {
                return Ok(session.clone());
            }
            tracing::info!(
                "Rotating session for {} (requests: {}, errors: {})",
                domain,
                session.request_count(),
                session.error_count()
            );
            self.persist(domain, session);
        }

        let session = Arc::new(self.create_session(domain)?);
        *current = Some(session.clone());
        Ok(session)
    }

    /// Replaces the current session of a domain unconditionally
    pub fn rotate_session(&self, domain: &str) -> Result<Arc<BrowserSession>, SessionError> {
        let slot = self.slot(domain);
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(old) = current.as_ref() {
            self.persist(domain, old);
        }

        let session = Arc::new(self.create_session(domain)?);
        *current = Some(session.clone());
        tracing::info!("Force rotated session for {}", domain);
        Ok(session)
    }

    /// Records an error status against the domain's current session
    pub fn report_error(&self, domain: &str, status: u16) {
        if let Some(session) = self.current(domain) {
            session.record_error(status);
        }
    }

    /// The current session of a domain without creating or rotating it
    pub fn current(&self, domain: &str) -> Option<Arc<BrowserSession>> {
        let slot = self.slots.get(domain)?.value().clone();
        let current = slot.lock().unwrap_or_else(|e| e.into_inner());
        current.clone()
    }

    /// Persists the cookie jar of every current session
    ///
    /// # Returns
    ///
    /// The number of jars written
    pub fn save_all_cookies(&self) -> usize {
        if self.cookies.is_none() {
            return 0;
        }

        self.current_sessions()
            .into_iter()
            .filter(|(domain, session)| self.persist(domain, session))
            .count()
    }

    pub fn stats(&self) -> BTreeMap<String, SessionStats> {
        self.current_sessions()
            .into_iter()
            .map(|(domain, session)| (domain, session.stats()))
            .collect()
    }

    fn current_sessions(&self) -> Vec<(String, Arc<BrowserSession>)> {
        let slots: Vec<_> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        slots
            .into_iter()
            .filter_map(|(domain, slot)| {
                let current = slot.lock().unwrap_or_else(|e| e.into_inner());
                current.clone().map(|s| (domain, s))
            })
            .collect()
    }

    fn create_session(&self, domain: &str) -> Result<BrowserSession, SessionError> {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}_{}_{}", domain, counter, chrono::Utc::now().timestamp());

        let mut rng = rand::thread_rng();
        let family = BrowserFamily::pick(&mut rng);
        let user_agent = family.pick_user_agent(&mut rng);

        let session = BrowserSession::new(
            id,
            family,
            user_agent,
            cookie_url(domain)?,
            self.config.clone(),
            self.timeout,
            self.connect_timeout,
        )?;

        if let Some(store) = &self.cookies {
            match store.load(domain) {
                Ok(saved) if !saved.is_empty() => {
                    fill_jar(session.jar(), session.cookie_url(), &saved);
                    tracing::debug!("Loaded {} cookies for {}", saved.len(), domain);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to load cookies for {}: {}", domain, e),
            }
        }

        tracing::debug!("Created new session: {} ({})", session.id(), family);
        Ok(session)
    }

    /// Saves a session's cookies; failures are logged, never raised
    fn persist(&self, domain: &str, session: &BrowserSession) -> bool {
        let Some(store) = &self.cookies else {
            return false;
        };

        match store.save(domain, &session.cookies()) {
            Ok(()) => {
                tracing::debug!("Saved cookies for {}", domain);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to save cookies for {}: {}", domain, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookies::jar_cookies;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, max_requests: u32) -> SessionManager {
        SessionManager::new(
            dir.path(),
            SessionConfig {
                max_requests,
                ..SessionConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_same_session_until_budget_spent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 2);

        let first = manager.get_session("billa.bg").unwrap();
        first.begin_request();
        let again = manager.get_session("billa.bg").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        again.begin_request();
        let rotated = manager.get_session("billa.bg").unwrap();
        assert!(!Arc::ptr_eq(&first, &rotated));
        assert_eq!(rotated.request_count(), 0);
    }

    #[tokio::test]
    async fn test_session_id_format() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 10);
        let session = manager.get_session("lidl.bg").unwrap();
        let parts: Vec<_> = session.id().rsplitn(3, '_').collect();
        assert_eq!(parts[2], "lidl.bg");
        assert_eq!(parts[1], "1");
        assert!(parts[0].parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_reported_block_rotates() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 100);
        let first = manager.get_session("metro.bg").unwrap();

        manager.report_error("metro.bg", 500);
        assert!(Arc::ptr_eq(&first, &manager.get_session("metro.bg").unwrap()));

        manager.report_error("metro.bg", 429);
        assert!(!Arc::ptr_eq(&first, &manager.get_session("metro.bg").unwrap()));
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 100);
        let a = manager.get_session("a.example").unwrap();
        let b = manager.get_session("b.example").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(manager.stats().len(), 2);
        assert!(manager.current("c.example").is_none());
    }

    #[tokio::test]
    async fn test_cookies_survive_rotation() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 100);

        let first = manager.get_session("kaufland.bg").unwrap();
        first
            .jar()
            .add_cookie_str("visitor=v-77; Path=/", first.cookie_url());

        let second = manager.rotate_session("kaufland.bg").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            jar_cookies(second.jar(), second.cookie_url()).get("visitor"),
            Some(&"v-77".to_string())
        );
        assert!(dir.path().join("kaufland_bg_cookies.json").exists());
    }

    #[tokio::test]
    async fn test_save_all_cookies() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 100);
        manager.get_session("a.example").unwrap();
        manager.get_session("b.example").unwrap();
        assert_eq!(manager.save_all_cookies(), 2);
        assert!(dir.path().join("a_example_cookies.json").exists());
    }

    #[tokio::test]
    async fn test_persistence_disabled() {
        let dir = TempDir::new().unwrap();
        let manager = SessionManager::new(
            dir.path(),
            SessionConfig {
                cookie_persistence: false,
                ..SessionConfig::default()
            },
        );
        manager.get_session("a.example").unwrap();
        assert_eq!(manager.save_all_cookies(), 0);
        assert!(!dir.path().join("a_example_cookies.json").exists());
    }
}
