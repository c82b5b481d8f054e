//! Prerelease directory history
//!
//! Loose-file prerelease builds live in directories named
//! `firmware-<base>.<hash>` in a source repository. Their lifecycle is
//! reconstructed from that repository's commit messages:
//!
//! - `2.7.14.e959000 meshtastic/firmware@e959000` adds a directory
//! - `Delete firmware-2.7.13.ffb168b directory` removes one
//!
//! History accumulates in `prerelease_history.json` for one base version at
//! a time and starts over when a new base version is requested.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::cache::{Clock, SystemClock};
use crate::app::client::{Commit, ForgeClient};
use crate::app::files::{read_json, write_json_atomic};
use crate::app::static_regex;
use crate::constants::layout::FIRMWARE_DIR_PREFIX;
use crate::errors::TransferResult;

static DIRECTORY_RX: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"(?i)^firmware-(\d+\.\d+\.\d+)\.([0-9a-f]{6,40})$"));
static ADD_RX: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"(?i)^(\d+\.\d+\.\d+)\.([0-9a-f]{6,40})\b"));
static DELETE_RX: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?i)^delete\s+firmware-(\d+\.\d+\.\d+)\.([0-9a-f]{6,40})\b")
});

/// Identity encoded in a prerelease directory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereleaseId {
    pub base_version: String,
    pub commit_hash: String,
}

impl PrereleaseId {
    pub fn directory_name(&self) -> String {
        format!("{}{}.{}", FIRMWARE_DIR_PREFIX, self.base_version, self.commit_hash)
    }
}

/// Parse `firmware-<base>.<hash>`; the hash is normalized to lowercase
pub fn parse_prerelease_directory(name: &str) -> Option<PrereleaseId> {
    let caps = DIRECTORY_RX.captures(name.trim())?;
    Some(PrereleaseId {
        base_version: caps.get(1)?.as_str().to_string(),
        commit_hash: caps.get(2)?.as_str().to_lowercase(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrereleaseStatus {
    Active,
    Deleted,
}

/// One prerelease directory as seen through commit history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrereleaseDirectoryEntry {
    pub directory: String,
    pub base_version: String,
    pub commit_hash: String,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub removed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub added_sha: Option<String>,
    #[serde(default)]
    pub removed_sha: Option<String>,
    pub active: bool,
    pub status: PrereleaseStatus,
    /// Time of the most recent add or delete event
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl PrereleaseDirectoryEntry {
    fn new(id: &PrereleaseId) -> Self {
        Self {
            directory: id.directory_name(),
            base_version: id.base_version.clone(),
            commit_hash: id.commit_hash.clone(),
            added_at: None,
            removed_at: None,
            added_sha: None,
            removed_sha: None,
            active: false,
            status: PrereleaseStatus::Deleted,
            last_event_at: None,
        }
    }

    fn record_add(&mut self, commit: &Commit) {
        if self.added_at.is_none() {
            self.added_at = commit.committed_at;
        }
        if self.added_sha.is_none() {
            self.added_sha = Some(commit.sha.clone());
        }
        self.active = true;
        self.status = PrereleaseStatus::Active;
        self.removed_at = None;
        self.removed_sha = None;
        self.last_event_at = commit.committed_at.or(self.last_event_at);
    }

    fn record_delete(&mut self, commit: &Commit) {
        if self.removed_at.is_none() {
            self.removed_at = commit.committed_at;
        }
        if self.removed_sha.is_none() {
            self.removed_sha = Some(commit.sha.clone());
        }
        self.active = false;
        self.status = PrereleaseStatus::Deleted;
        self.last_event_at = commit.committed_at.or(self.last_event_at);
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Add,
    Delete,
}

fn parse_event(line: &str) -> Option<(Event, PrereleaseId)> {
    let (event, caps) = if let Some(caps) = ADD_RX.captures(line) {
        (Event::Add, caps)
    } else {
        (Event::Delete, DELETE_RX.captures(line)?)
    };
    Some((
        event,
        PrereleaseId {
            base_version: caps.get(1)?.as_str().to_string(),
            commit_hash: caps.get(2)?.as_str().to_lowercase(),
        },
    ))
}

/// Most recent event first, then by directory name
fn sort_entries(entries: &mut [PrereleaseDirectoryEntry]) {
    entries.sort_by(|a, b| {
        b.last_event_at
            .cmp(&a.last_event_at)
            .then_with(|| b.directory.cmp(&a.directory))
    });
}

/// Build the directory history for `base_version` from a commit listing
///
/// `commits` is in forge order (newest first); events are replayed oldest
/// first so each directory ends in the state of its latest event. Commits
/// repeated in the listing are counted once.
pub fn build_history(commits: &[Commit], base_version: &str) -> Vec<PrereleaseDirectoryEntry> {
    let mut by_directory: BTreeMap<String, PrereleaseDirectoryEntry> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for commit in commits.iter().rev() {
        if !seen.insert(commit.sha.as_str()) {
            continue;
        }

        for line in commit.message.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((event, id)) = parse_event(line) else {
                continue;
            };
            if id.base_version != base_version {
                continue;
            }

            let entry = by_directory
                .entry(id.directory_name())
                .or_insert_with(|| PrereleaseDirectoryEntry::new(&id));
            match event {
                Event::Add => entry.record_add(commit),
                Event::Delete => entry.record_delete(commit),
            }
        }
    }

    let mut entries: Vec<PrereleaseDirectoryEntry> = by_directory.into_values().collect();
    sort_entries(&mut entries);
    entries
}

/// Counts reported after a prerelease scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrereleaseSummary {
    pub created: usize,
    pub deleted: usize,
    pub active: usize,
}

pub fn summarize(entries: &[PrereleaseDirectoryEntry]) -> PrereleaseSummary {
    PrereleaseSummary {
        created: entries
            .iter()
            .filter(|e| e.added_at.is_some() || e.added_sha.is_some())
            .count(),
        deleted: entries
            .iter()
            .filter(|e| e.status == PrereleaseStatus::Deleted)
            .count(),
        active: entries.iter().filter(|e| e.active).count(),
    }
}

/// Persisted accumulation for one base version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryState {
    #[serde(default)]
    base_version: String,
    #[serde(default)]
    entries: Vec<PrereleaseDirectoryEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl HistoryState {
    /// Merge a fresh build into the accumulated entries
    ///
    /// Fresh entries carry the latest known state; stored entries that fell
    /// out of the commit window are kept as they were.
    fn merge(&mut self, fresh: Vec<PrereleaseDirectoryEntry>) {
        let mut merged: BTreeMap<String, PrereleaseDirectoryEntry> = self
            .entries
            .drain(..)
            .map(|e| (e.directory.clone(), e))
            .collect();

        for mut entry in fresh {
            if let Some(previous) = merged.get(&entry.directory) {
                entry.added_at = match (previous.added_at, entry.added_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                entry.added_sha = previous.added_sha.clone().or(entry.added_sha);
            }
            merged.insert(entry.directory.clone(), entry);
        }

        self.entries = merged.into_values().collect();
        sort_entries(&mut self.entries);
    }
}

/// Correlates commit history with the prerelease directory listing
#[derive(Debug, Clone)]
pub struct PrereleaseHistoryBuilder {
    client: Arc<ForgeClient>,
    repo: String,
    state_path: PathBuf,
    commit_scan_count: usize,
    clock: Arc<dyn Clock>,
}

impl PrereleaseHistoryBuilder {
    pub fn new(
        client: Arc<ForgeClient>,
        repo: impl Into<String>,
        state_path: impl Into<PathBuf>,
        commit_scan_count: usize,
    ) -> Self {
        Self {
            client,
            repo: repo.into(),
            state_path: state_path.into(),
            commit_scan_count,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn load_state(&self) -> HistoryState {
        match read_json::<HistoryState>(&self.state_path).await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!("Rebuilding prerelease history: {}", e);
                HistoryState::default()
            }
        }
    }

    /// Directory history for `base_version`, most recent event first
    ///
    /// Commit listing failures fall back to the accumulated state.
    pub async fn commit_history(&self, base_version: &str) -> Vec<PrereleaseDirectoryEntry> {
        let mut state = self.load_state().await;
        if state.base_version != base_version {
            if !state.base_version.is_empty() {
                info!(
                    "Prerelease base version changed {} -> {}, resetting history",
                    state.base_version, base_version
                );
            }
            state = HistoryState {
                base_version: base_version.to_string(),
                ..HistoryState::default()
            };
        }

        match self.client.commits(&self.repo, self.commit_scan_count).await {
            Ok(commits) => {
                state.merge(build_history(&commits, base_version));
                state.last_updated = Some(self.clock.now());
                if let Err(e) = write_json_atomic(&self.state_path, &state).await {
                    warn!("Prerelease history not saved: {}", e);
                }
            }
            Err(e) => warn!(
                "Could not fetch commits for {}: {}; using stored prerelease history",
                self.repo, e
            ),
        }

        let summary = summarize(&state.entries);
        debug!(
            "Prerelease history for {}: {} created, {} deleted, {} active",
            base_version, summary.created, summary.deleted, summary.active
        );
        state.entries
    }

    /// Directory names at the top of the prerelease repository
    pub async fn remote_directories(&self) -> TransferResult<Vec<String>> {
        let entries = self.client.contents(&self.repo, "").await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_dir())
            .map(|e| e.name)
            .collect())
    }

    /// Newest active directory for `base_version` that also exists remotely
    pub async fn latest_remote_directory(&self, base_version: &str) -> TransferResult<Option<String>> {
        let listing: HashSet<String> = self.remote_directories().await?.into_iter().collect();
        let history = self.commit_history(base_version).await;
        Ok(pick_latest(&history, &listing))
    }
}

/// First active history entry present in `listing`
pub fn pick_latest(history: &[PrereleaseDirectoryEntry], listing: &HashSet<String>) -> Option<String> {
    history
        .iter()
        .filter(|e| e.active && listing.contains(&e.directory))
        .map(|e| e.directory.clone())
        .next()
}
