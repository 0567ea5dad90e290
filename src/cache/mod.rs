//! Last-known-good results, one JSON file per source
//!
//! A result is written after every successful live fetch and served, flagged
//! with its age, when every tier of a source fails. Files are replaced
//! atomically (write to a sibling, then rename) and writes to one source are
//! serialized while reads may overlap.

use crate::url::sanitize_domain;
use crate::Record;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised while reading or writing cache files
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cache file: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk cache record of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub source_id: String,
    pub products: Vec<Record>,
    /// RFC 3339 timestamp of the fetch that produced the records
    pub cached_at: DateTime<Utc>,
    pub product_count: usize,
}

impl CachedResult {
    pub fn new(source_id: impl Into<String>, products: Vec<Record>) -> Self {
        Self {
            source_id: source_id.into(),
            product_count: products.len(),
            products,
            cached_at: Utc::now(),
        }
    }

    /// Time elapsed since the records were fetched (zero if in the future)
    pub fn age(&self) -> std::time::Duration {
        (Utc::now() - self.cached_at).to_std().unwrap_or_default()
    }

    pub fn age_hours(&self) -> f64 {
        self.age().as_secs_f64() / 3600.0
    }
}

#[derive(Debug, Default)]
struct CacheSlot {
    /// Whether the file has been read since startup
    loaded: bool,
    value: Option<Arc<CachedResult>>,
}

/// File-backed cache with a write-through in-memory copy
#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    slots: DashMap<String, Arc<RwLock<CacheSlot>>>,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/{source_id}_cache.json`
    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}_cache.json", sanitize_domain(source_id)))
    }

    fn slot(&self, source_id: &str) -> Arc<RwLock<CacheSlot>> {
        if let Some(slot) = self.slots.get(source_id) {
            return slot.value().clone();
        }
        self.slots
            .entry(source_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Returns the cached result of a source, reading its file on first use
    ///
    /// # Returns
    ///
    /// * `Ok(Some(_))` - A cached result exists
    /// * `Ok(None)` - Nothing has ever been cached for this source
    /// * `Err(CacheError)` - The file exists but could not be read
    pub async fn load(&self, source_id: &str) -> Result<Option<Arc<CachedResult>>, CacheError> {
        let slot = self.slot(source_id);
        {
            let guard = slot.read().await;
            if guard.loaded {
                return Ok(guard.value.clone());
            }
        }

        let mut guard = slot.write().await;
        if !guard.loaded {
            guard.value = self.read_file(source_id).await?.map(Arc::new);
            guard.loaded = true;
        }
        Ok(guard.value.clone())
    }

    async fn read_file(&self, source_id: &str) -> Result<Option<CachedResult>, CacheError> {
        let path = self.path_for(source_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let cached: CachedResult = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            "Loaded cache for {} ({} records from {})",
            source_id,
            cached.product_count,
            cached.cached_at
        );
        Ok(Some(cached))
    }

    /// Caches freshly fetched records, replacing the previous result
    pub async fn store(
        &self,
        source_id: &str,
        products: &[Record],
    ) -> Result<Arc<CachedResult>, CacheError> {
        self.put(CachedResult::new(source_id, products.to_vec())).await
    }

    /// Writes a complete cache record
    pub async fn put(&self, result: CachedResult) -> Result<Arc<CachedResult>, CacheError> {
        let slot = self.slot(&result.source_id);
        let mut guard = slot.write().await;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&result.source_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&result)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            "Cached {} records for {}",
            result.product_count,
            result.source_id
        );
        let result = Arc::new(result);
        guard.value = Some(result.clone());
        guard.loaded = true;
        Ok(result)
    }
}
