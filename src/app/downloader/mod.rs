//! Per-family release downloaders
//!
//! A [`ReleaseDownloader`] owns one artifact family: it lists the family's
//! releases, records them in the release history, decides which versions to
//! keep, fetches and optionally extracts their matching assets, updates
//! `latest_release.json` and prunes version directories that fell out of the
//! keep window.
//!
//! # Module Organization
//!
//! - [`family`] - Family identities, directory conventions and settings
//! - [`tracking`] - `latest_release.json` and `prerelease_tracking.json`
//! - [`prerelease`] - Loose-file prerelease downloads for the firmware family

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::app::client::{Asset, ForgeClient, Release};
use crate::app::files::archive::{is_executable_name, set_executable};
use crate::app::files::integrity::write_sidecar;
use crate::app::files::{
    check_file, extract_archive, prepare_for_redownload, ExpectedFile, FileCheck, PatternFilter,
};
use crate::app::history::{
    classify, release_label, Channel, HistorySnapshot, ReleaseHistoryTracker, ReleaseStatus,
};
use crate::app::orchestrator::results::{DownloadResult, FileType};
use crate::app::transfer::{TransferRequest, Transferer};
use crate::app::version::sort_newest_first;
use crate::constants::files::ZIP_EXTENSION;
use crate::constants::layout::LATEST_RELEASE_FILE;
use crate::errors::{ArchiveError, ArchiveResult, ErrorKind};

pub mod family;
pub mod prerelease;
pub mod tracking;

pub use family::{is_version_directory, release_dir_name, Family, FamilyConfig};
pub use prerelease::{PrereleaseConfig, PrereleaseDownloader};
pub use tracking::{LatestReleaseRecord, PrereleaseTracking};

/// Releases to keep on disk, newest first
///
/// Releases are ranked by version, not by publication order. With
/// `filter_revoked` the window is filled with non-revoked releases; when
/// every candidate is revoked the newest one is kept. `keep_last_prerelease`
/// adds the newest alpha/beta release when it is not already in the window.
pub fn select_releases_to_keep(
    releases: &[Release],
    keep_count: usize,
    keep_last_prerelease: bool,
    filter_revoked: bool,
) -> Vec<Release> {
    let mut sorted: Vec<Release> = releases
        .iter()
        .filter(|r| !r.tag_name.trim().is_empty())
        .cloned()
        .collect();
    sort_newest_first(&mut sorted, |r| r.tag_name.as_str());

    let revoked: HashSet<String> = sorted
        .iter()
        .filter(|r| classify(r).revoked)
        .map(|r| r.tag_name.clone())
        .collect();
    let is_revoked = |r: &Release| revoked.contains(&r.tag_name);

    let mut kept: Vec<Release> = if filter_revoked {
        let mut window: Vec<Release> = sorted
            .iter()
            .filter(|r| !is_revoked(r))
            .take(keep_count)
            .cloned()
            .collect();
        if window.is_empty() && keep_count > 0 {
            window.extend(sorted.first().cloned());
        }
        window
    } else {
        sorted.iter().take(keep_count).cloned().collect()
    };

    if keep_last_prerelease {
        let newest_prerelease = sorted.iter().find(|r| {
            let channel = classify(r).channel;
            (r.prerelease || matches!(channel, Channel::Alpha | Channel::Beta))
                && !(filter_revoked && is_revoked(r))
        });
        if let Some(release) = newest_prerelease {
            if !kept.iter().any(|k| k.tag_name == release.tag_name) {
                debug!("Also keeping prerelease {}", release.tag_name);
                kept.push(release.clone());
            }
        }
    }

    sort_newest_first(&mut kept, |r| r.tag_name.as_str());
    kept
}

/// Tag for `latest_release.json`: highest non-revoked, else highest revoked
pub fn latest_release_tag(releases: &[Release]) -> Option<String> {
    let mut sorted: Vec<&Release> = releases
        .iter()
        .filter(|r| !r.tag_name.trim().is_empty())
        .collect();
    sort_newest_first(&mut sorted, |r| r.tag_name.as_str());

    sorted
        .iter()
        .find(|r| !classify(r).revoked)
        .or_else(|| sorted.first())
        .map(|r| r.tag_name.clone())
}

fn is_zip_name(name: &str) -> bool {
    name.to_lowercase().ends_with(ZIP_EXTENSION)
}

/// Results of one family pass
#[derive(Debug, Clone)]
pub struct FamilyReport {
    pub family: Family,
    pub results: Vec<DownloadResult>,
    /// Tags kept in this pass, newest first
    pub kept: Vec<String>,
    pub latest: Option<String>,
    /// Directories pruned in this pass
    pub removed: Vec<PathBuf>,
}

impl FamilyReport {
    fn new(family: Family) -> Self {
        Self {
            family,
            results: Vec::new(),
            kept: Vec::new(),
            latest: None,
            removed: Vec::new(),
        }
    }

    pub fn has_retryable_failures(&self) -> bool {
        self.results.iter().any(|r| !r.success && r.retryable)
    }
}

/// Downloader for one artifact family
#[derive(Debug)]
pub struct ReleaseDownloader {
    family: Family,
    config: FamilyConfig,
    repo: String,
    root: PathBuf,
    client: Arc<ForgeClient>,
    transferer: Transferer,
    history: ReleaseHistoryTracker,
    asset_filter: PatternFilter,
    extract_filter: PatternFilter,
}

impl ReleaseDownloader {
    /// Create a downloader writing below `download_dir/<family dir>`
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::InvalidPattern` if an asset or extraction
    /// pattern does not compile
    pub fn new(
        family: Family,
        config: FamilyConfig,
        download_dir: &Path,
        history: ReleaseHistoryTracker,
        client: Arc<ForgeClient>,
        transferer: Transferer,
    ) -> ArchiveResult<Self> {
        let asset_filter =
            PatternFilter::new(&config.include_patterns_for(family), &config.exclude_patterns)?;
        let extract_filter =
            PatternFilter::new(&config.extract_patterns, &config.extract_exclude_patterns)?;

        Ok(Self {
            family,
            repo: config.repo_for(family),
            root: download_dir.join(family.dir_name()),
            config,
            client,
            transferer,
            history,
            asset_filter,
            extract_filter,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn config(&self) -> &FamilyConfig {
        &self.config
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn latest_release_path(&self) -> PathBuf {
        self.root.join(LATEST_RELEASE_FILE)
    }

    pub fn release_dir(&self, tag: &str) -> PathBuf {
        self.root.join(release_dir_name(tag))
    }

    fn file_type(&self) -> FileType {
        FileType::for_family(self.family)
    }

    /// Local path of an asset; names with path separators are flattened
    fn asset_path(&self, tag: &str, asset: &Asset) -> Option<PathBuf> {
        let name = asset.name.trim();
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.release_dir(tag).join(name.replace(['/', '\\'], "_")))
    }

    /// Assets selected by the family's include/exclude patterns
    pub fn matching_assets<'a>(&self, release: &'a Release) -> Vec<&'a Asset> {
        release
            .assets
            .iter()
            .filter(|asset| self.asset_filter.matches(&asset.name))
            .collect()
    }

    /// Recent releases within the scan window
    pub async fn fetch_releases(&self) -> crate::errors::TransferResult<Vec<Release>> {
        self.client.releases(&self.repo, self.config.scan_count()).await
    }

    pub fn select_releases_to_keep(&self, releases: &[Release]) -> Vec<Release> {
        select_releases_to_keep(
            releases,
            self.config.keep_count,
            self.config.keep_last_prerelease,
            self.config.filter_revoked,
        )
    }

    /// Every matching asset is present with the expected size and digest
    pub async fn is_release_complete(&self, release: &Release) -> bool {
        for asset in self.matching_assets(release) {
            let Some(path) = self.asset_path(&release.tag_name, asset) else {
                return false;
            };
            let expected = ExpectedFile {
                size: asset.size,
                digest: asset.sha256(),
            };
            if !check_file(&path, &expected).await.is_valid() {
                return false;
            }
        }
        true
    }

    /// Fetch the release's missing or invalid assets, then extract
    ///
    /// Revoked releases are neither downloaded nor extracted. Extraction only
    /// runs when every asset of the release is in place.
    pub async fn download(&self, release: &Release, revoked: bool) -> Vec<DownloadResult> {
        let tag = release.tag_name.as_str();
        let file_type = self.file_type();
        let assets = self.matching_assets(release);
        if assets.is_empty() {
            debug!("No assets of {} match the configured patterns", tag);
            return Vec::new();
        }

        if revoked {
            info!("Skipping {}: release is revoked", release_label(release));
            return assets
                .iter()
                .filter_map(|asset| self.asset_path(tag, asset))
                .map(|path| DownloadResult::skipped(self.family, tag, &path, file_type))
                .collect();
        }

        let mut results = Vec::new();
        let mut requests = Vec::new();
        let mut archives = Vec::new();

        for asset in assets {
            let Some(path) = self.asset_path(tag, asset) else {
                results.push(DownloadResult::failed(
                    self.family,
                    tag,
                    &self.release_dir(tag),
                    file_type,
                    ErrorKind::ValidationError,
                    format!("unusable asset name {:?}", asset.name),
                ));
                continue;
            };
            if is_zip_name(&asset.name) {
                archives.push(path.clone());
            }

            let expected = ExpectedFile {
                size: asset.size,
                digest: asset.sha256(),
            };
            match check_file(&path, &expected).await {
                FileCheck::Valid => {
                    debug!("{} already present", path.display());
                    results.push(DownloadResult::skipped(self.family, tag, &path, file_type));
                    continue;
                }
                FileCheck::Missing => {}
                check => {
                    warn!(
                        "{} failed verification ({:?}), downloading again",
                        path.display(),
                        check
                    );
                    prepare_for_redownload(&path).await;
                }
            }

            requests.push(
                TransferRequest::new(&asset.browser_download_url, &path)
                    .with_expected(asset.size, asset.sha256()),
            );
        }

        let outcomes = self.transferer.transfer_all(&requests).await;
        for (request, outcome) in requests.iter().zip(outcomes) {
            let path = &request.destination;
            match outcome.result {
                Ok(file) => {
                    if let Err(e) = write_sidecar(path, &file.digest).await {
                        warn!("Could not write checksum for {}: {}", path.display(), e);
                    }
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                    if name.as_deref().is_some_and(is_executable_name) {
                        if let Err(e) = set_executable(path) {
                            warn!("Could not mark {} executable: {}", path.display(), e);
                        }
                    }
                    info!("Downloaded {}", path.display());
                    results.push(DownloadResult::completed(
                        self.family,
                        tag,
                        path,
                        file_type,
                        outcome.retries,
                    ));
                }
                Err(e) => {
                    error!("Failed to download {}: {}", path.display(), e);
                    results.push(
                        DownloadResult::failed(
                            self.family,
                            tag,
                            path,
                            file_type,
                            e.kind(),
                            e.to_string(),
                        )
                        .with_retry_count(outcome.retries),
                    );
                }
            }
        }

        let all_present = results.iter().all(|r| r.success);
        if self.config.auto_extract && self.extract_filter.has_include_patterns() && all_present {
            results.extend(self.extract(tag, &archives).await);
        }
        results
    }

    /// Extract matching entries of downloaded archives into the release directory
    async fn extract(&self, tag: &str, archives: &[PathBuf]) -> Vec<DownloadResult> {
        let destination = self.release_dir(tag);
        let mut results = Vec::new();

        for archive in archives {
            match extract_archive(archive.clone(), destination.clone(), self.extract_filter.clone()).await {
                Ok(report) => {
                    for entry in &report.rejected {
                        results.push(DownloadResult::failed(
                            self.family,
                            tag,
                            archive,
                            FileType::Extraction,
                            ErrorKind::PathTraversal,
                            format!("rejected archive entry {}", entry),
                        ));
                    }
                    if report.extracted.is_empty() {
                        results.push(DownloadResult::skipped(
                            self.family,
                            tag,
                            archive,
                            FileType::Extraction,
                        ));
                    }
                    for path in &report.extracted {
                        results.push(DownloadResult::completed(
                            self.family,
                            tag,
                            path,
                            FileType::Extraction,
                            0,
                        ));
                    }
                }
                Err(e @ ArchiveError::Corrupt { .. }) => {
                    warn!("{}; removing it so it is downloaded again", e);
                    prepare_for_redownload(archive).await;
                    results.push(
                        DownloadResult::failed(
                            self.family,
                            tag,
                            archive,
                            FileType::Extraction,
                            e.kind(),
                            e.to_string(),
                        )
                        .with_retryable(true),
                    );
                }
                Err(e) => {
                    error!("Extraction of {} failed: {}", archive.display(), e);
                    results.push(DownloadResult::failed(
                        self.family,
                        tag,
                        archive,
                        FileType::Extraction,
                        e.kind(),
                        e.to_string(),
                    ));
                }
            }
        }
        results
    }

    /// Remove version directories not named by `kept_tags`
    ///
    /// Directories outside the version naming convention and the family's
    /// reserved directories are never touched.
    pub async fn cleanup(&self, kept_tags: &[String]) -> Vec<PathBuf> {
        let keep: HashSet<String> = kept_tags.iter().map(|t| release_dir_name(t)).collect();
        let mut removed = Vec::new();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return removed,
            Err(e) => {
                warn!("Could not scan {}: {}", self.root.display(), e);
                return removed;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if !is_dir
                || self.family.reserved_dirs().contains(&name.as_str())
                || !is_version_directory(&name)
                || keep.contains(&name)
            {
                continue;
            }

            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    info!("Removed old {} version {}", self.family, name);
                    removed.push(entry.path());
                }
                Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
            }
        }
        removed
    }

    /// Record the latest resolved release
    pub async fn update_latest_release(&self, releases: &[Release]) -> Option<String> {
        let latest = latest_release_tag(releases)?;
        match LatestReleaseRecord::store_if_changed(
            &self.latest_release_path(),
            &latest,
            self.family.as_str(),
            Utc::now(),
        )
        .await
        {
            Ok(true) => info!("Latest {} release is now {}", self.family, latest),
            Ok(false) => debug!("Latest {} release unchanged ({})", self.family, latest),
            Err(e) => warn!("Could not record latest {} release: {}", self.family, e),
        }
        Some(latest)
    }

    fn is_revoked(release: &Release, snapshot: &HistorySnapshot) -> bool {
        classify(release).revoked
            || snapshot.status_of(&release.tag_name) == Some(ReleaseStatus::Revoked)
    }

    /// One complete pass over the family
    pub async fn run(&self) -> FamilyReport {
        let mut report = FamilyReport::new(self.family);
        info!("Checking {} releases from {}", self.family.label(), self.repo);

        let releases = match self.fetch_releases().await {
            Ok(releases) => releases,
            Err(e) => {
                error!("Could not list {} releases: {}", self.family, e);
                report.results.push(DownloadResult::failed(
                    self.family,
                    &self.repo,
                    &self.root,
                    self.file_type(),
                    e.kind(),
                    e.to_string(),
                ));
                return report;
            }
        };
        if releases.is_empty() {
            info!("No {} releases found", self.family);
            return report;
        }

        let snapshot = self.history.update(&releases).await;
        self.history.log_status_summary(&snapshot);
        self.history.log_duplicate_base_versions(&releases);

        let kept = self.select_releases_to_keep(&releases);
        for release in &kept {
            if self.transferer.shutdown().is_triggered() {
                info!("Cancelled, not checking remaining {} releases", self.family);
                return report;
            }
            info!("Checking {}…", release_label(release));
            let revoked = Self::is_revoked(release, &snapshot);
            report.results.extend(self.download(release, revoked).await);
        }
        report.kept = kept.iter().map(|r| r.tag_name.clone()).collect();
        report.latest = self.update_latest_release(&releases).await;

        if !self.transferer.shutdown().is_triggered() {
            report.removed = self.cleanup(&report.kept).await;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::{CacheConfig, CacheStore};
    use crate::app::client::ClientConfig;
    use crate::app::files::archive::test_support::build_zip;
    use crate::app::hash::Sha256Digest;
    use crate::app::signals::Shutdown;
    use crate::app::transfer::TransferConfig;
    use mockito::Server;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tags(releases: &[Release]) -> Vec<&str> {
        releases.iter().map(|r| r.tag_name.as_str()).collect()
    }

    fn revoked(tag: &str) -> Release {
        let mut release = Release::new(tag);
        release.body = Some("This release was revoked due to regressions.".to_string());
        release
    }

    fn beta(tag: &str) -> Release {
        let mut release = Release::new(tag);
        release.name = Some(format!("Firmware {} Beta", tag));
        release
    }

    #[test]
    fn test_select_keeps_newest_by_version() {
        // listed out of version order
        let releases = vec![Release::new("v2"), Release::new("v1"), Release::new("v3")];
        let kept = select_releases_to_keep(&releases, 2, false, true);
        assert_eq!(tags(&kept), vec!["v3", "v2"]);
    }

    #[test]
    fn test_select_skips_revoked_when_filtering() {
        let releases = vec![revoked("v2.0.3"), Release::new("v2.0.2"), Release::new("v2.0.1")];

        let kept = select_releases_to_keep(&releases, 2, false, true);
        assert_eq!(tags(&kept), vec!["v2.0.2", "v2.0.1"]);

        let kept = select_releases_to_keep(&releases, 2, false, false);
        assert_eq!(tags(&kept), vec!["v2.0.3", "v2.0.2"]);
    }

    /// Purpose: with only revoked candidates the newest one is kept
    #[test]
    fn test_select_all_revoked_keeps_newest() {
        let releases = vec![revoked("v2.0.1"), revoked("v2.0.2")];
        let kept = select_releases_to_keep(&releases, 2, false, true);
        assert_eq!(tags(&kept), vec!["v2.0.2"]);
        assert!(select_releases_to_keep(&releases, 0, false, true).is_empty());
    }

    #[test]
    fn test_select_keeps_last_prerelease() {
        let releases = vec![
            Release::new("v2.7.15"),
            Release::new("v2.7.14"),
            beta("v2.7.13"),
            beta("v2.7.12"),
        ];

        let kept = select_releases_to_keep(&releases, 1, true, true);
        assert_eq!(tags(&kept), vec!["v2.7.15", "v2.7.13"]);

        let kept = select_releases_to_keep(&releases, 3, true, true);
        assert_eq!(tags(&kept), vec!["v2.7.15", "v2.7.14", "v2.7.13"]);
    }

    #[test]
    fn test_latest_release_tag_prefers_non_revoked() {
        let releases = vec![revoked("v2.0.3"), Release::new("v2.0.2")];
        assert_eq!(latest_release_tag(&releases).as_deref(), Some("v2.0.2"));
        assert_eq!(
            latest_release_tag(&[revoked("v2.0.3")]).as_deref(),
            Some("v2.0.3")
        );
        assert_eq!(latest_release_tag(&[]), None);
    }

    fn downloader(server_url: &str, temp_dir: &TempDir, config: FamilyConfig) -> ReleaseDownloader {
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache"), CacheConfig::default()));
        let client_config = ClientConfig::default()
            .with_api_base_url(server_url)
            .with_api_retries(0, Duration::from_millis(1));
        let client = Arc::new(ForgeClient::new(&client_config, cache).unwrap());
        let transferer = Transferer::new(
            client.http_client().clone(),
            TransferConfig::default().with_retries(0, Duration::from_millis(1)),
            Shutdown::new(),
        );
        let history = ReleaseHistoryTracker::new(temp_dir.path().join("history.json"), "Firmware");
        ReleaseDownloader::new(
            Family::Firmware,
            config,
            &temp_dir.path().join("downloads"),
            history,
            client,
            transferer,
        )
        .unwrap()
    }

    fn asset(name: &str, url: String, content: &[u8]) -> Asset {
        Asset {
            name: name.to_string(),
            browser_download_url: url,
            size: Some(content.len() as u64),
            digest: Some(format!("sha256:{}", Sha256Digest::of_bytes(content).to_hex())),
        }
    }

    /// Purpose: pruning only touches version directories outside the keep set
    #[tokio::test]
    async fn test_cleanup_prunes_only_version_directories() {
        let temp_dir = TempDir::new().unwrap();
        let dl = downloader("http://127.0.0.1:9", &temp_dir, FamilyConfig::default());
        for dir in ["v3", "v2", "v1", "notes", "prerelease", "repo-dls", "v2-backup", "v1notes"] {
            std::fs::create_dir_all(dl.root().join(dir)).unwrap();
        }
        std::fs::write(dl.root().join("v0.9"), b"a file, not a directory").unwrap();

        let removed = dl.cleanup(&["v3".to_string(), "v2".to_string()]).await;

        assert_eq!(removed, vec![dl.root().join("v1")]);
        for dir in ["v3", "v2", "notes", "prerelease", "repo-dls", "v2-backup", "v1notes"] {
            assert!(dl.root().join(dir).is_dir(), "{} should remain", dir);
        }
        assert!(dl.root().join("v0.9").is_file());
    }

    #[tokio::test]
    async fn test_download_extract_and_skip_on_second_pass() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let zip = build_zip(&[
            ("device-install.sh", b"#!/bin/sh\necho flash\n"),
            ("firmware-rak4631-1.0.0.uf2", b"uf2"),
        ]);
        let mock = server
            .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
            .with_body(zip.clone())
            .expect(1)
            .create_async()
            .await;

        let config = FamilyConfig::default()
            .with_include_patterns(["rak4631"])
            .with_extraction(["device-install.sh"]);
        let dl = downloader(&server.url(), &temp_dir, config);

        let mut release = Release::new("v1.0.0");
        release.assets = vec![
            asset(
                "firmware-rak4631-1.0.0.zip",
                format!("{}/dl/firmware-rak4631-1.0.0.zip", server.url()),
                &zip,
            ),
            asset("firmware-tbeam-1.0.0.zip", format!("{}/dl/other.zip", server.url()), b"x"),
        ];

        assert!(!dl.is_release_complete(&release).await);
        let results = dl.download(&release, false).await;
        assert!(results.iter().all(|r| r.success), "{:?}", results);
        assert_eq!(results.iter().filter(|r| r.is_downloaded()).count(), 2);

        let script = dl.release_dir("v1.0.0").join("device-install.sh");
        assert!(script.is_file());
        assert!(!dl.release_dir("v1.0.0").join("firmware-rak4631-1.0.0.uf2").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        assert!(dl.is_release_complete(&release).await);
        let again = dl.download(&release, false).await;
        assert!(again.iter().all(|r| r.success && r.was_skipped), "{:?}", again);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_revoked_release_not_downloaded() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let mock = server
            .mock("GET", "/dl/fw.zip")
            .expect(0)
            .create_async()
            .await;

        let dl = downloader(&server.url(), &temp_dir, FamilyConfig::default());
        let mut release = revoked("v2.0.3");
        release.assets = vec![asset("fw.zip", format!("{}/dl/fw.zip", server.url()), b"zip")];

        let results = dl.download(&release, true).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].was_skipped);
        assert!(!dl.release_dir("v2.0.3").join("fw.zip").exists());
        mock.assert_async().await;
    }

    /// Purpose: a corrupt local archive is replaced rather than trusted
    #[tokio::test]
    async fn test_corrupt_local_file_redownloaded() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let zip = build_zip(&[("a.bin", b"payload")]);
        let _mock = server
            .mock("GET", "/dl/fw.zip")
            .with_body(zip.clone())
            .expect(1)
            .create_async()
            .await;

        let dl = downloader(&server.url(), &temp_dir, FamilyConfig::default());
        let mut release = Release::new("v1.0.0");
        let mut fw = asset("fw.zip", format!("{}/dl/fw.zip", server.url()), &zip);
        fw.digest = None;
        release.assets = vec![fw];

        let path = dl.release_dir("v1.0.0").join("fw.zip");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut garbage = vec![0u8; zip.len()];
        garbage[..4].copy_from_slice(b"PK\x03\x04");
        std::fs::write(&path, &garbage).unwrap();

        let results = dl.download(&release, false).await;
        assert!(results[0].is_downloaded(), "{:?}", results);
        assert_eq!(std::fs::read(&path).unwrap(), zip);
    }

    #[tokio::test]
    async fn test_missing_asset_reported_not_retryable() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let _mock = server
            .mock("GET", "/dl/gone.zip")
            .with_status(404)
            .create_async()
            .await;

        let dl = downloader(&server.url(), &temp_dir, FamilyConfig::default());
        let mut release = Release::new("v1.0.0");
        release.assets = vec![asset("gone.zip", format!("{}/dl/gone.zip", server.url()), b"z")];

        let results = dl.download(&release, false).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(!results[0].retryable);
        assert_eq!(results[0].error_kind, Some(ErrorKind::HttpClientError));
    }
}
