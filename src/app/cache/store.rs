//! TTL-bounded metadata cache persisted as one JSON document per kind

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use crate::app::files::atomic::write_atomic;
use crate::errors::{CacheError, CacheResult};

/// Families of cached remote metadata, each with its own document and TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Releases,
    Contents,
    Commits,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Releases, CacheKind::Contents, CacheKind::Commits];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Releases => "releases",
            CacheKind::Contents => "contents",
            CacheKind::Commits => "commits",
        }
    }

    fn file_name(self) -> String {
        format!("{}_cache.json", self.as_str())
    }
}

/// One cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
}

/// Result of a cache read
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
    pub is_fresh: bool,
}

type CacheDocument = BTreeMap<String, CacheEntry>;

/// Metadata cache shared by every remote call
///
/// Read-modify-write cycles are serialized within the process; each
/// mutation rewrites the whole document through a temp file.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Create a store rooted at `root` using the wall clock
    pub fn new(root: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self::with_clock(root, config, Arc::new(SystemClock))
    }

    /// Create a store with an injected time source
    pub fn with_clock(root: impl Into<PathBuf>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let root = root.into();
        debug!("Metadata cache rooted at {}", root.display());
        Self {
            root,
            config,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn document_path(&self, kind: CacheKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    async fn load(&self, kind: CacheKind) -> CacheDocument {
        let path = self.document_path(kind);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheDocument::new(),
            Err(e) => {
                warn!("Could not read cache {}: {}", path.display(), e);
                return CacheDocument::new();
            }
        };

        serde_json::from_slice(&content).unwrap_or_else(|e| {
            warn!("Ignoring corrupt cache {}: {}", path.display(), e);
            CacheDocument::new()
        })
    }

    async fn save(&self, kind: CacheKind, document: &CacheDocument) -> CacheResult<()> {
        let path = self.document_path(kind);
        let content = serde_json::to_vec_pretty(document)?;
        write_atomic(&path, &content)
            .await
            .map_err(|e| CacheError::Persistence {
                path: path.clone(),
                reason: e.to_string(),
            })
    }

    /// Look up `key`, reporting whether the entry is still within its TTL
    ///
    /// Expired entries are returned with `is_fresh == false`.
    pub async fn get(&self, kind: CacheKind, key: &str) -> Option<CacheLookup> {
        let mut document = self.load(kind).await;
        let entry = document.remove(key)?;

        let ttl = self.config.ttl_for(kind);
        let age = self.clock.now().signed_duration_since(entry.cached_at);
        let is_fresh = match age.to_std() {
            Ok(age) => age <= ttl,
            // timestamp in the future
            Err(_) => false,
        };

        Some(CacheLookup {
            payload: entry.payload,
            cached_at: entry.cached_at,
            is_fresh,
        })
    }

    /// Fresh entry decoded as `T`; stale or undecodable entries are misses
    pub async fn get_fresh<T: DeserializeOwned>(&self, kind: CacheKind, key: &str) -> Option<T> {
        let lookup = self.get(kind, key).await?;
        if !lookup.is_fresh {
            debug!("Cache entry {}:{} expired", kind.as_str(), key);
            return None;
        }

        match serde_json::from_value(lookup.payload) {
            Ok(value) => {
                debug!("Cache hit for {}:{}", kind.as_str(), key);
                Some(value)
            }
            Err(e) => {
                debug!("Discarding undecodable cache entry {}:{}: {}", kind.as_str(), key, e);
                None
            }
        }
    }

    /// Store `payload` under `key`, stamped with the current time
    pub async fn put(&self, kind: CacheKind, key: &str, payload: Value) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load(kind).await;
        document.insert(
            key.to_string(),
            CacheEntry {
                payload,
                cached_at: self.clock.now(),
            },
        );
        self.save(kind, &document).await
    }

    /// Serialize and store `value` under `key`
    pub async fn put_typed<T: Serialize>(&self, kind: CacheKind, key: &str, value: &T) -> CacheResult<()> {
        let payload = serde_json::to_value(value)?;
        self.put(kind, key, payload).await
    }

    /// Drop `key`; returns whether an entry existed
    pub async fn invalidate(&self, kind: CacheKind, key: &str) -> CacheResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load(kind).await;
        if document.remove(key).is_none() {
            return Ok(false);
        }
        self.save(kind, &document).await?;
        Ok(true)
    }

    /// Remove every cache document; returns the number of documents deleted
    pub async fn clear_all(&self) -> CacheResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;

        for kind in CacheKind::ALL {
            let path = self.document_path(kind);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheError::Persistence {
                        path,
                        reason: e.to_string(),
                    })
                }
            }
        }

        info!("Cleared {} cache document(s) in {}", removed, self.root.display());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store_with_clock(temp_dir: &TempDir) -> (CacheStore, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let config = CacheConfig::default().with_ttl(CacheKind::Releases, Duration::from_secs(60));
        let store = CacheStore::with_clock(temp_dir.path(), config, clock.clone());
        (store, clock)
    }

    /// Purpose: entries are fresh inside the TTL and stale beyond it
    /// Benefit: repeated runs reuse listings without network calls
    #[tokio::test]
    async fn test_ttl_freshness() {
        let temp_dir = TempDir::new().unwrap();
        let (store, clock) = store_with_clock(&temp_dir);

        store
            .put(CacheKind::Releases, "meshtastic/firmware", json!(["v1.0.0"]))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(30));
        let lookup = store.get(CacheKind::Releases, "meshtastic/firmware").await.unwrap();
        assert!(lookup.is_fresh);
        assert_eq!(lookup.payload, json!(["v1.0.0"]));

        clock.advance(chrono::Duration::seconds(60));
        let lookup = store.get(CacheKind::Releases, "meshtastic/firmware").await.unwrap();
        assert!(!lookup.is_fresh, "stale payload is still returned, marked stale");
        assert_eq!(lookup.payload, json!(["v1.0.0"]));

        let fresh: Option<Vec<String>> = store
            .get_fresh(CacheKind::Releases, "meshtastic/firmware")
            .await;
        assert!(fresh.is_none());
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _clock) = store_with_clock(&temp_dir);

        store.put(CacheKind::Commits, "key", json!(1)).await.unwrap();
        assert!(store.get(CacheKind::Releases, "key").await.is_none());
        assert!(temp_dir.path().join("commits_cache.json").exists());
        assert!(!temp_dir.path().join("releases_cache.json").exists());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_all() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _clock) = store_with_clock(&temp_dir);

        store.put_typed(CacheKind::Contents, "a", &vec![1, 2]).await.unwrap();
        store.put_typed(CacheKind::Contents, "b", &vec![3]).await.unwrap();
        store.put_typed(CacheKind::Commits, "c", &"x").await.unwrap();

        assert!(store.invalidate(CacheKind::Contents, "a").await.unwrap());
        assert!(!store.invalidate(CacheKind::Contents, "a").await.unwrap());
        let remaining: Option<Vec<i32>> = store.get_fresh(CacheKind::Contents, "b").await;
        assert_eq!(remaining, Some(vec![3]));

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.get(CacheKind::Contents, "b").await.is_none());
        assert_eq!(store.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_document_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _clock) = store_with_clock(&temp_dir);
        std::fs::write(temp_dir.path().join("releases_cache.json"), b"{{{").unwrap();

        assert!(store.get(CacheKind::Releases, "anything").await.is_none());

        store.put(CacheKind::Releases, "k", json!(true)).await.unwrap();
        assert!(store.get(CacheKind::Releases, "k").await.unwrap().is_fresh);
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_all_keys() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _clock) = store_with_clock(&temp_dir);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .put(CacheKind::Commits, &format!("key-{}", i), json!(i))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            assert!(store.get(CacheKind::Commits, &format!("key-{}", i)).await.is_some());
        }
    }
}
