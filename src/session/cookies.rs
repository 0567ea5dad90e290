use crate::session::SessionError;
use crate::url::sanitize_domain;
use dashmap::DashMap;
use reqwest::cookie::{CookieStore as _, Jar};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Cookie files on disk, one JSON name→value map per domain
///
/// Writes to one domain's file are serialized; clones share the locks.
#[derive(Debug, Clone)]
pub struct CookieStore {
    dir: PathBuf,
    write_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    tmp_seq: Arc<AtomicU64>,
}

impl CookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_locks: Arc::new(DashMap::new()),
            tmp_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn write_lock(&self, domain: &str) -> Arc<Mutex<()>> {
        let key = sanitize_domain(domain);
        if let Some(lock) = self.write_locks.get(&key) {
            return lock.value().clone();
        }
        self.write_locks.entry(key).or_default().value().clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/{safe_domain}_cookies.json`
    pub fn path_for(&self, domain: &str) -> PathBuf {
        self.dir
            .join(format!("{}_cookies.json", sanitize_domain(domain)))
    }

    /// Reads the saved cookies of a domain; a missing file yields an empty map
    pub fn load(&self, domain: &str) -> Result<BTreeMap<String, String>, SessionError> {
        let path = self.path_for(domain);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites the saved cookies of a domain
    pub fn save(&self, domain: &str, cookies: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let body = serde_json::to_vec(cookies)?;
        let lock = self.write_lock(domain);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(domain);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq));
        if let Err(e) = std::fs::write(&tmp, &body).and_then(|_| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// The URL cookies of a domain are stored and read under
pub(crate) fn cookie_url(domain: &str) -> Result<Url, SessionError> {
    Url::parse(&format!("https://{}/", domain))
        .map_err(|_| SessionError::InvalidDomain(domain.to_string()))
}

/// Cookies the jar would send to `url`, as a name→value map
pub(crate) fn jar_cookies(jar: &Jar, url: &Url) -> BTreeMap<String, String> {
    let Some(header) = jar.cookies(url) else {
        return BTreeMap::new();
    };
    let Ok(header) = header.to_str() else {
        return BTreeMap::new();
    };

    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Adds every cookie of `cookies` to the jar, scoped to the whole site
pub(crate) fn fill_jar(jar: &Jar, url: &Url, cookies: &BTreeMap<String, String>) {
    for (name, value) in cookies {
        jar.add_cookie_str(&format!("{}={}; Path=/", name, value), url);
    }
}
