//! Cache configuration types and defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::store::CacheKind;
use crate::constants::cache;

/// Configuration for the metadata cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for cache documents (`<download_dir>/.cache` if None)
    pub cache_root: Option<PathBuf>,
    /// Lifetime of release listings
    #[serde(with = "humantime_serde")]
    pub releases_ttl: Duration,
    /// Lifetime of repository directory listings
    #[serde(with = "humantime_serde")]
    pub contents_ttl: Duration,
    /// Lifetime of commit metadata
    #[serde(with = "humantime_serde")]
    pub commits_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            releases_ttl: cache::RELEASES_TTL,
            contents_ttl: cache::CONTENTS_TTL,
            commits_ttl: cache::COMMITS_TTL,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Set the lifetime for one cache kind
    pub fn with_ttl(mut self, kind: CacheKind, ttl: Duration) -> Self {
        match kind {
            CacheKind::Releases => self.releases_ttl = ttl,
            CacheKind::Contents => self.contents_ttl = ttl,
            CacheKind::Commits => self.commits_ttl = ttl,
        }
        self
    }

    /// Lifetime for entries of `kind`
    pub fn ttl_for(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Releases => self.releases_ttl,
            CacheKind::Contents => self.contents_ttl,
            CacheKind::Commits => self.commits_ttl,
        }
    }
}
