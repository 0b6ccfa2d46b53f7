//! # Cache Manager Module
//!
//! Stores generated shopping lists keyed by menu fingerprint. There is at
//! most one live entry per fingerprint and a write replaces it atomically.
//! Backends implement [`CacheStore`]; [`CacheManager`] adds optional TTL
//! hygiene and hit/miss statistics on top of any of them.
//!
//! Entries never expire for correctness. Staleness is busted by explicit
//! invalidation or by a `use_cache = false` request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::generation_errors::GenerationError;
use crate::shopping_list::ShoppingList;

/// One cached shopping list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub payload: Arc<ShoppingList>,
    pub created_at: DateTime<Utc>,
    /// Generation token of the job that produced the payload
    pub generation_token: u64,
}

impl CacheEntry {
    pub fn new(fingerprint: &str, payload: ShoppingList, generation_token: u64) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            payload: Arc::new(payload),
            created_at: Utc::now(),
            generation_token,
        }
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }
}

/// Storage backend for cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, GenerationError>;

    /// Insert or replace the entry for `entry.fingerprint`
    async fn store(&self, entry: &CacheEntry) -> Result<(), GenerationError>;

    /// Delete an entry. Returns whether one existed.
    async fn remove(&self, fingerprint: &str) -> Result<bool, GenerationError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, GenerationError> {
        Ok(self.entries.read().await.get(fingerprint).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), GenerationError> {
        self.entries
            .write()
            .await
            .insert(entry.fingerprint.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool, GenerationError> {
        Ok(self.entries.write().await.remove(fingerprint).is_some())
    }
}

/// One JSON file per fingerprint in a directory
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, fingerprint: &str) -> Result<PathBuf, GenerationError> {
        if fingerprint.is_empty()
            || !fingerprint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(GenerationError::CacheUnavailable(format!(
                "invalid fingerprint for file cache: '{fingerprint}'"
            )));
        }
        Ok(self.dir.join(format!("{fingerprint}.json")))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, GenerationError> {
        let path = self.path_for(fingerprint)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A corrupt file reads as a miss and gets overwritten by the next write
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), GenerationError> {
        let path = self.path_for(&entry.fingerprint)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| GenerationError::CacheUnavailable(e.to_string()))?;

        // Write to a temp file and rename over the target so readers never see a partial entry
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", entry.fingerprint, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote cache file {}", path.display());
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool, GenerationError> {
        let path = self.path_for(fingerprint)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Counters exposed by [`CacheManager::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub expired: u64,
}

/// Cache front end used by the generation service
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    expired: AtomicU64,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Treat entries older than `ttl` as misses
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, GenerationError> {
        let entry = match self.store.load(fingerprint).await? {
            Some(entry) => entry,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        if let Some(ttl) = self.ttl {
            if entry.age() > ttl {
                debug!("Cache entry {} expired after {:?}", fingerprint, entry.age());
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.store.remove(fingerprint).await {
                    warn!("Could not drop expired cache entry {}: {}", fingerprint, e);
                }
                return Ok(None);
            }
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    /// Store `payload` as the live entry, replacing any previous one
    pub async fn put(
        &self,
        fingerprint: &str,
        payload: ShoppingList,
        generation_token: u64,
    ) -> Result<CacheEntry, GenerationError> {
        let entry = CacheEntry::new(fingerprint, payload, generation_token);
        self.store.store(&entry).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        info!(
            "Cached shopping list {} (token {}) in {} store",
            fingerprint,
            generation_token,
            self.store.name()
        );
        Ok(entry)
    }

    /// Delete the entry. Idempotent.
    pub async fn invalidate(&self, fingerprint: &str) -> Result<bool, GenerationError> {
        let removed = self.store.remove(fingerprint).await?;
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            info!("Invalidated cached shopping list {}", fingerprint);
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store.name())
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}
