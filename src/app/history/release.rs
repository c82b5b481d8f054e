//! Release lifecycle history
//!
//! Every tag ever seen in a family's live release list gets an entry that
//! records its channel and whether it is active, revoked or removed. The
//! history is advisory: a failure to read or write it is logged and the
//! pipeline carries on with whatever it could compute.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classify::{classify, release_label, Channel};
use crate::app::cache::{Clock, SystemClock};
use crate::app::client::Release;
use crate::app::files::{read_json, write_json_atomic};
use crate::app::version::extract_base_version;

/// Lifecycle status of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Active,
    Revoked,
    Removed,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Active => "active",
            ReleaseStatus::Revoked => "revoked",
            ReleaseStatus::Removed => "removed",
        }
    }
}

/// Persisted record for one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseHistoryEntry {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub base_version: String,
    pub status: ReleaseStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

/// Contents of `release_history.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    #[serde(default)]
    pub entries: BTreeMap<String, ReleaseHistoryEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl HistorySnapshot {
    pub fn entry(&self, tag: &str) -> Option<&ReleaseHistoryEntry> {
        self.entries.get(tag)
    }

    pub fn status_of(&self, tag: &str) -> Option<ReleaseStatus> {
        self.entries.get(tag).map(|entry| entry.status)
    }

    pub fn count(&self, status: ReleaseStatus) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.status == status)
            .count()
    }

    /// Fold the current live release list into the history
    ///
    /// Status only moves forward while a tag stays listed: once revoked, a
    /// release stays revoked even if a later edit drops the marker from its
    /// notes. A removed tag that shows up again is reactivated with its
    /// freshly classified status.
    pub fn apply(&mut self, releases: &[Release], now: DateTime<Utc>) {
        let current: HashSet<&str> = releases
            .iter()
            .map(|r| r.tag_name.as_str())
            .filter(|tag| !tag.is_empty())
            .collect();
        let oldest_published = releases.iter().filter_map(|r| r.published_at).min();

        for release in releases.iter().filter(|r| !r.tag_name.is_empty()) {
            let classification = classify(release);
            let observed = if classification.revoked {
                ReleaseStatus::Revoked
            } else {
                ReleaseStatus::Active
            };

            let entry = self
                .entries
                .entry(release.tag_name.clone())
                .or_insert_with(|| ReleaseHistoryEntry {
                    tag: release.tag_name.clone(),
                    name: String::new(),
                    channel: classification.channel,
                    base_version: String::new(),
                    status: observed,
                    published_at: None,
                    first_seen_at: now,
                    last_seen_at: now,
                    status_changed_at: now,
                    removed_at: None,
                });

            let status = match entry.status {
                ReleaseStatus::Revoked => ReleaseStatus::Revoked,
                _ => observed,
            };
            if status != entry.status {
                debug!(
                    "{}: {} -> {}",
                    release.tag_name,
                    entry.status.as_str(),
                    status.as_str()
                );
                entry.status_changed_at = now;
            }

            entry.status = status;
            entry.name = release.title().to_string();
            entry.channel = classification.channel;
            entry.base_version = extract_base_version(&release.tag_name);
            entry.published_at = release.published_at.or(entry.published_at);
            entry.last_seen_at = now;
            entry.removed_at = None;
        }

        for (tag, entry) in self.entries.iter_mut() {
            if current.contains(tag.as_str()) || entry.status == ReleaseStatus::Removed {
                continue;
            }
            if !within_live_window(entry.published_at, oldest_published) {
                continue;
            }
            debug!("{} no longer listed, marking removed", tag);
            entry.status = ReleaseStatus::Removed;
            entry.removed_at = Some(now);
            entry.status_changed_at = now;
        }

        self.last_updated = Some(now);
    }

    /// Revoked and removed entries, newest publication first
    fn flagged_entries(&self) -> Vec<&ReleaseHistoryEntry> {
        let mut flagged: Vec<&ReleaseHistoryEntry> = self
            .entries
            .values()
            .filter(|e| e.status != ReleaseStatus::Active)
            .collect();
        flagged.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.tag.cmp(&a.tag))
        });
        flagged
    }
}

/// A missing tag only counts as removed when it is at least as new as the
/// oldest listed release; older tags have just scrolled out of the scan
/// window. Without both timestamps the tag is treated as removed.
fn within_live_window(
    published_at: Option<DateTime<Utc>>,
    oldest_listed: Option<DateTime<Utc>>,
) -> bool {
    match (published_at, oldest_listed) {
        (Some(published), Some(oldest)) => published >= oldest,
        _ => true,
    }
}

/// Tracks the lifecycle history of one artifact family
#[derive(Debug, Clone)]
pub struct ReleaseHistoryTracker {
    path: PathBuf,
    label: String,
    clock: Arc<dyn Clock>,
}

impl ReleaseHistoryTracker {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self::with_clock(path, label, Arc::new(SystemClock))
    }

    pub fn with_clock(
        path: impl Into<PathBuf>,
        label: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted history, or an empty one if missing or unreadable
    pub async fn load(&self) -> HistorySnapshot {
        match read_json::<HistorySnapshot>(&self.path).await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!("Rebuilding release history: {}", e);
                HistorySnapshot::default()
            }
        }
    }

    /// Record the current live release list and persist the result
    ///
    /// An empty list leaves the history untouched, so a failed listing never
    /// marks every known tag as removed.
    pub async fn update(&self, releases: &[Release]) -> HistorySnapshot {
        let mut snapshot = self.load().await;
        if releases.is_empty() {
            return snapshot;
        }

        snapshot.apply(releases, self.clock.now());

        if let Err(e) = write_json_atomic(&self.path, &snapshot).await {
            warn!("{} release history not saved: {}", self.label, e);
        }
        snapshot
    }

    /// Log counts and tags of revoked and removed releases
    pub fn log_status_summary(&self, snapshot: &HistorySnapshot) {
        let revoked = snapshot.count(ReleaseStatus::Revoked);
        let removed = snapshot.count(ReleaseStatus::Removed);
        if revoked == 0 && removed == 0 {
            return;
        }

        info!(
            "{} release status: {} revoked, {} removed",
            self.label, revoked, removed
        );
        for entry in snapshot.flagged_entries() {
            match entry.channel.label() {
                Some(channel) => info!("  - {} ({}, {})", entry.tag, channel, entry.status.as_str()),
                None => info!("  - {} ({})", entry.tag, entry.status.as_str()),
            }
        }
    }

    /// Log groups of live releases that share a base version
    pub fn log_duplicate_base_versions(&self, releases: &[Release]) {
        let mut groups: BTreeMap<String, Vec<&Release>> = BTreeMap::new();
        for release in releases.iter().filter(|r| !r.tag_name.is_empty()) {
            groups
                .entry(extract_base_version(&release.tag_name))
                .or_default()
                .push(release);
        }

        for (base, group) in groups.iter().filter(|(_, g)| g.len() > 1) {
            let labels: Vec<String> = group.iter().map(|r| release_label(r)).collect();
            info!(
                "{}: multiple releases share base version {}: {}",
                self.label,
                base,
                labels.join(", ")
            );
        }
    }
}
