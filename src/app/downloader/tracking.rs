//! Per-family state files
//!
//! `latest_release.json` names the most recently resolved release and
//! `prerelease_tracking.json` lists the prerelease builds seen since that
//! release. Both may be deleted by hand at any time; a missing or corrupt
//! file reads as empty and is rewritten on the next run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::files::{read_json, write_json_atomic};
use crate::errors::StateResult;

/// Contents of `latest_release.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReleaseRecord {
    pub latest_version: String,
    pub file_type: String,
    pub last_updated: DateTime<Utc>,
}

impl LatestReleaseRecord {
    pub async fn load(path: &Path) -> Option<Self> {
        match read_json::<Self>(path).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring latest release record: {}", e);
                None
            }
        }
    }

    /// Record `tag` unless it is already the stored value
    ///
    /// Returns true when the file was rewritten.
    pub async fn store_if_changed(
        path: &Path,
        tag: &str,
        file_type: &str,
        now: DateTime<Utc>,
    ) -> StateResult<bool> {
        if Self::load(path)
            .await
            .is_some_and(|record| record.latest_version == tag)
        {
            return Ok(false);
        }

        let record = Self {
            latest_version: tag.to_string(),
            file_type: file_type.to_string(),
            last_updated: now,
        };
        write_json_atomic(path, &record).await?;
        Ok(true)
    }
}

/// Contents of `prerelease_tracking.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrereleaseTracking {
    /// Release the tracked prereleases follow
    #[serde(default)]
    pub release: String,
    /// Prerelease identifiers (`<base>.<hash>`) in the order first seen
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PrereleaseTracking {
    pub async fn load(path: &Path) -> Self {
        match read_json::<Self>(path).await {
            Ok(tracking) => tracking.unwrap_or_default(),
            Err(e) => {
                warn!("Resetting prerelease tracking: {}", e);
                Self::default()
            }
        }
    }

    /// Note `prerelease_id` as seen after `release`
    ///
    /// Tracking starts over when `release` differs from the stored one.
    /// Returns true when the state changed.
    pub fn record(&mut self, release: &str, prerelease_id: &str, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if self.release != release {
            if !self.release.is_empty() {
                info!(
                    "New release {} detected (previously tracking {}), resetting prerelease tracking",
                    release, self.release
                );
            }
            self.release = release.to_string();
            self.commits.clear();
            changed = true;
        }

        let id = prerelease_id.to_lowercase();
        if !self.commits.contains(&id) {
            self.commits.push(id);
            changed = true;
        }

        if changed {
            self.last_updated = Some(now);
        }
        changed
    }

    pub async fn save(&self, path: &Path) -> StateResult<()> {
        write_json_atomic(path, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_latest_release_written_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latest_release.json");
        let now = Utc::now();

        assert!(LatestReleaseRecord::store_if_changed(&path, "v1.0.0", "firmware", now)
            .await
            .unwrap());
        assert!(!LatestReleaseRecord::store_if_changed(&path, "v1.0.0", "firmware", now)
            .await
            .unwrap());

        let record = LatestReleaseRecord::load(&path).await.unwrap();
        assert_eq!(record.latest_version, "v1.0.0");
        assert_eq!(record.file_type, "firmware");
    }

    #[tokio::test]
    async fn test_hand_deleted_or_corrupt_files_read_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prerelease_tracking.json");
        assert_eq!(PrereleaseTracking::load(&path).await, PrereleaseTracking::default());

        std::fs::write(&path, b"[1, 2").unwrap();
        assert_eq!(PrereleaseTracking::load(&path).await, PrereleaseTracking::default());
        assert!(LatestReleaseRecord::load(&path).await.is_none());
    }

    #[test]
    fn test_tracking_resets_on_new_release() {
        let now = Utc::now();
        let mut tracking = PrereleaseTracking::default();

        assert!(tracking.record("v2.7.13", "2.7.14.E959000", now));
        assert!(!tracking.record("v2.7.13", "2.7.14.e959000", now));
        assert!(tracking.record("v2.7.13", "2.7.14.1c0c6b2", now));
        assert_eq!(tracking.commits, vec!["2.7.14.e959000", "2.7.14.1c0c6b2"]);

        assert!(tracking.record("v2.7.14", "2.7.15.aaaaaa1", now));
        assert_eq!(tracking.release, "v2.7.14");
        assert_eq!(tracking.commits, vec!["2.7.15.aaaaaa1"]);
    }

    #[tokio::test]
    async fn test_tracking_round_trip_schema() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prerelease_tracking.json");
        let mut tracking = PrereleaseTracking::default();
        tracking.record("v2.7.13", "2.7.14.e959000", Utc::now());
        tracking.save(&path).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["release"], "v2.7.13");
        assert_eq!(raw["commits"][0], "2.7.14.e959000");
        assert!(raw["last_updated"].is_string());
    }
}
