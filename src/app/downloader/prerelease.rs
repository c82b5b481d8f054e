//! Loose-file prerelease downloads for the firmware family
//!
//! Prerelease builds are not published as releases; they appear as
//! `firmware-<base>.<hash>` directories in a separate repository. The
//! expected base version is the one following the latest release, and the
//! directory to mirror is resolved from commit history, falling back to the
//! repository listing when no commit mentions that version yet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::app::client::{ContentEntry, ForgeClient};
use crate::app::downloader::{Family, PrereleaseTracking};
use crate::app::files::archive::{is_executable_name, set_executable};
use crate::app::files::{check_file, prepare_for_redownload, ExpectedFile, FileCheck, PatternFilter};
use crate::app::history::{parse_prerelease_directory, PrereleaseHistoryBuilder};
use crate::app::orchestrator::results::{DownloadResult, FileType};
use crate::app::transfer::{TransferRequest, Transferer};
use crate::app::version::expected_next_version;
use crate::constants::{forge, layout};
use crate::errors::{ArchiveResult, TransferResult};

/// `[prerelease]` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrereleaseConfig {
    pub enabled: bool,
    /// Repository publishing the prerelease directories
    pub repo: String,
    /// File names to download (substring or glob); empty selects everything
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Commits scanned for prerelease add/delete events
    pub commit_scan_count: usize,
}

impl Default for PrereleaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo: forge::PRERELEASE_REPO.to_string(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            commit_scan_count: forge::COMMIT_SCAN_COUNT,
        }
    }
}

/// Results of one prerelease pass
#[derive(Debug, Clone, Default)]
pub struct PrereleaseReport {
    pub results: Vec<DownloadResult>,
    /// Directory mirrored in this pass
    pub active: Option<String>,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct PrereleaseDownloader {
    config: PrereleaseConfig,
    /// `<download_dir>/firmware/prerelease`
    root: PathBuf,
    tracking_path: PathBuf,
    client: Arc<ForgeClient>,
    transferer: Transferer,
    builder: PrereleaseHistoryBuilder,
    filter: PatternFilter,
}

impl PrereleaseDownloader {
    /// # Errors
    ///
    /// Returns `ArchiveError::InvalidPattern` if a file pattern does not compile
    pub fn new(
        config: PrereleaseConfig,
        download_dir: &Path,
        history_path: &Path,
        client: Arc<ForgeClient>,
        transferer: Transferer,
    ) -> ArchiveResult<Self> {
        let filter = PatternFilter::new(&config.include_patterns, &config.exclude_patterns)?;
        let family_root = download_dir.join(Family::Firmware.dir_name());
        let builder = PrereleaseHistoryBuilder::new(
            Arc::clone(&client),
            config.repo.clone(),
            history_path,
            config.commit_scan_count,
        );

        Ok(Self {
            root: family_root.join(layout::PRERELEASE_DIR),
            tracking_path: family_root.join(layout::PRERELEASE_TRACKING_FILE),
            config,
            client,
            transferer,
            builder,
            filter,
        })
    }

    pub fn config(&self) -> &PrereleaseConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tracking_path(&self) -> &Path {
        &self.tracking_path
    }

    /// Active prerelease directory for `base_version`
    ///
    /// Prefers commit history; otherwise the highest listed directory name
    /// for the base version.
    pub async fn resolve_directory(&self, base_version: &str) -> TransferResult<Option<String>> {
        if let Some(directory) = self.builder.latest_remote_directory(base_version).await? {
            return Ok(Some(directory));
        }

        let mut candidates: Vec<String> = self
            .builder
            .remote_directories()
            .await?
            .into_iter()
            .filter(|name| {
                parse_prerelease_directory(name).is_some_and(|id| id.base_version == base_version)
            })
            .collect();
        candidates.sort();
        let fallback = candidates.pop();
        if let Some(directory) = &fallback {
            debug!("No commit mentions {}; using listed directory {}", base_version, directory);
        }
        Ok(fallback)
    }

    async fn remote_files(&self, directory: &str) -> TransferResult<Vec<ContentEntry>> {
        let entries = self.client.contents(&self.config.repo, directory).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_file() && e.download_url.is_some())
            .filter(|e| self.filter.matches(&e.name))
            .collect())
    }

    fn failure(&self, tag: &str, path: &Path, error: &crate::errors::DownloadError) -> DownloadResult {
        DownloadResult::failed(
            Family::Firmware,
            tag,
            path,
            FileType::FirmwarePrerelease,
            error.kind(),
            error.to_string(),
        )
    }

    /// Mirror the prerelease that follows `latest_release`
    pub async fn run(&self, latest_release: &str) -> PrereleaseReport {
        let mut report = PrereleaseReport::default();
        let Some(expected) = expected_next_version(latest_release) else {
            debug!("No next version can be derived from {}", latest_release);
            return report;
        };
        info!("Looking for {} prereleases after {}", expected, latest_release);

        let directory = match self.resolve_directory(&expected).await {
            Ok(Some(directory)) => directory,
            Ok(None) => {
                info!("No prerelease published for {}", expected);
                report.removed = self.prune(None).await;
                return report;
            }
            Err(e) => {
                error!("Could not resolve prerelease for {}: {}", expected, e);
                report.results.push(self.failure(&expected, &self.root, &e));
                return report;
            }
        };

        let files = match self.remote_files(&directory).await {
            Ok(files) => files,
            Err(e) => {
                error!("Could not list prerelease {}: {}", directory, e);
                report.results.push(self.failure(&directory, &self.root.join(&directory), &e));
                return report;
            }
        };
        if files.is_empty() {
            info!("Prerelease {} has no matching files", directory);
        }

        report.results = self.download_files(&directory, &files).await;
        self.record(latest_release, &directory).await;
        report.active = Some(directory);

        if !self.transferer.shutdown().is_triggered() {
            report.removed = self.prune(report.active.as_deref()).await;
        }
        report
    }

    async fn download_files(&self, directory: &str, files: &[ContentEntry]) -> Vec<DownloadResult> {
        let target_dir = self.root.join(directory);
        let mut results = Vec::new();
        let mut requests = Vec::new();

        for file in files {
            let Some(url) = file.download_url.as_deref() else {
                continue;
            };
            let path = target_dir.join(file.name.replace(['/', '\\'], "_"));
            let expected = ExpectedFile {
                size: file.size,
                digest: None,
            };
            match check_file(&path, &expected).await {
                FileCheck::Valid => {
                    results.push(DownloadResult::skipped(
                        Family::Firmware,
                        directory,
                        &path,
                        FileType::FirmwarePrerelease,
                    ));
                    continue;
                }
                FileCheck::Missing => {}
                _ => {
                    prepare_for_redownload(&path).await;
                }
            }
            requests.push(TransferRequest::new(url, &path).with_expected(file.size, None));
        }

        for (request, outcome) in requests
            .iter()
            .zip(self.transferer.transfer_all(&requests).await)
        {
            let path = &request.destination;
            match outcome.result {
                Ok(file) => {
                    if let Err(e) =
                        crate::app::files::integrity::write_sidecar(path, &file.digest).await
                    {
                        warn!("Could not write checksum for {}: {}", path.display(), e);
                    }
                    let executable = path
                        .file_name()
                        .is_some_and(|n| is_executable_name(&n.to_string_lossy()));
                    if executable {
                        if let Err(e) = set_executable(path) {
                            warn!("Could not mark {} executable: {}", path.display(), e);
                        }
                    }
                    info!("Downloaded prerelease file {}", path.display());
                    results.push(DownloadResult::completed(
                        Family::Firmware,
                        directory,
                        path,
                        FileType::FirmwarePrerelease,
                        outcome.retries,
                    ));
                }
                Err(e) => {
                    error!("Failed to download {}: {}", path.display(), e);
                    results.push(self.failure(directory, path, &e).with_retry_count(outcome.retries));
                }
            }
        }
        results
    }

    async fn record(&self, latest_release: &str, directory: &str) {
        let Some(id) = parse_prerelease_directory(directory) else {
            return;
        };
        let mut tracking = PrereleaseTracking::load(&self.tracking_path).await;
        let prerelease_id = format!("{}.{}", id.base_version, id.commit_hash);
        if tracking.record(latest_release, &prerelease_id, Utc::now()) {
            if let Err(e) = tracking.save(&self.tracking_path).await {
                warn!("Could not save prerelease tracking: {}", e);
            }
        }
    }

    /// Remove prerelease directories other than `active`
    ///
    /// Only names of the form `firmware-<base>.<hash>` are considered.
    pub async fn prune(&self, active: Option<&str>) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.root).await else {
            return removed;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            let Some(id) = parse_prerelease_directory(&name) else {
                continue;
            };
            let is_active = active
                .and_then(parse_prerelease_directory)
                .is_some_and(|current| current == id);
            if !is_dir || is_active {
                continue;
            }

            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    info!("Removed superseded prerelease {}", name);
                    removed.push(entry.path());
                }
                Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::{CacheConfig, CacheStore};
    use crate::app::client::ClientConfig;
    use crate::app::signals::Shutdown;
    use crate::app::transfer::TransferConfig;
    use mockito::{Matcher, Server, ServerGuard};
    use std::time::Duration;
    use tempfile::TempDir;

    const REPO: &str = "/repos/meshtastic/meshtastic.github.io";

    fn downloader(server: &Server, temp_dir: &TempDir) -> PrereleaseDownloader {
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache"), CacheConfig::default()));
        let client_config = ClientConfig::default()
            .with_api_base_url(server.url())
            .with_api_retries(0, Duration::from_millis(1));
        let client = Arc::new(ForgeClient::new(&client_config, cache).unwrap());
        let transferer = Transferer::new(
            client.http_client().clone(),
            TransferConfig::default().with_retries(0, Duration::from_millis(1)),
            Shutdown::new(),
        );
        let config = PrereleaseConfig {
            enabled: true,
            include_patterns: vec!["rak4631".to_string(), "*.sh".to_string()],
            ..PrereleaseConfig::default()
        };
        PrereleaseDownloader::new(
            config,
            &temp_dir.path().join("downloads"),
            &temp_dir.path().join("prerelease_history.json"),
            client,
            transferer,
        )
        .unwrap()
    }

    async fn mock_listing(server: &mut ServerGuard, commits: &str) {
        server
            .mock("GET", format!("{}/contents/", REPO).as_str())
            .with_body(
                r#"[
                {"name": "firmware-2.7.14.e959000", "path": "firmware-2.7.14.e959000", "type": "dir"},
                {"name": "index.html", "path": "index.html", "type": "file"}
            ]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", format!("{}/commits", REPO).as_str())
            .match_query(Matcher::Any)
            .with_body(commits)
            .create_async()
            .await;
    }

    async fn mock_directory(server: &mut ServerGuard) {
        let base = server.url();
        server
            .mock("GET", format!("{}/contents/firmware-2.7.14.e959000", REPO).as_str())
            .with_body(format!(
                r#"[
                {{"name": "firmware-rak4631-2.7.14.e959000.uf2", "type": "file", "size": 3, "download_url": "{base}/raw/rak.uf2"}},
                {{"name": "device-install.sh", "type": "file", "size": 4, "download_url": "{base}/raw/install.sh"}},
                {{"name": "firmware-tbeam-2.7.14.e959000.bin", "type": "file", "size": 3, "download_url": "{base}/raw/tbeam.bin"}}
            ]"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/raw/rak.uf2")
            .with_body("uf2")
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/raw/install.sh")
            .with_body("#!sh")
            .expect(1)
            .create_async()
            .await;
    }

    /// Purpose: the active directory is mirrored, tracked, and older ones pruned
    #[tokio::test]
    async fn test_prerelease_mirrored_and_tracked() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        mock_listing(
            &mut server,
            r#"[{"sha": "c1", "commit": {"message": "2.7.14.e959000 meshtastic/firmware@e959000", "committer": {"date": "2025-10-02T09:00:00Z"}}}]"#,
        )
        .await;
        mock_directory(&mut server).await;

        let dl = downloader(&server, &temp_dir);
        std::fs::create_dir_all(dl.root().join("firmware-2.7.13.aaaaaa1")).unwrap();
        std::fs::create_dir_all(dl.root().join("my-builds")).unwrap();

        let report = dl.run("v2.7.13.597fa0b").await;
        assert_eq!(report.active.as_deref(), Some("firmware-2.7.14.e959000"));
        assert_eq!(report.results.len(), 2, "{:?}", report.results);
        assert!(report.results.iter().all(|r| r.is_downloaded()));
        assert!(report
            .results
            .iter()
            .all(|r| r.file_type == FileType::FirmwarePrerelease));

        let dir = dl.root().join("firmware-2.7.14.e959000");
        assert!(dir.join("firmware-rak4631-2.7.14.e959000.uf2").is_file());
        assert!(!dir.join("firmware-tbeam-2.7.14.e959000.bin").exists());
        assert!(!dl.root().join("firmware-2.7.13.aaaaaa1").exists());
        assert!(dl.root().join("my-builds").is_dir());

        let tracking = PrereleaseTracking::load(dl.tracking_path()).await;
        assert_eq!(tracking.release, "v2.7.13.597fa0b");
        assert_eq!(tracking.commits, vec!["2.7.14.e959000"]);

        // second pass finds everything in place
        let again = dl.run("v2.7.13.597fa0b").await;
        assert!(again.results.iter().all(|r| r.was_skipped), "{:?}", again.results);
    }

    #[tokio::test]
    async fn test_listing_fallback_without_commit_history() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        mock_listing(&mut server, "[]").await;

        let dl = downloader(&server, &temp_dir);
        let directory = dl.resolve_directory("2.7.14").await.unwrap();
        assert_eq!(directory.as_deref(), Some("firmware-2.7.14.e959000"));
        assert_eq!(dl.resolve_directory("2.7.15").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unparsable_release_skips_prereleases() {
        let server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let dl = downloader(&server, &temp_dir);

        let report = dl.run("nightly").await;
        assert!(report.results.is_empty());
        assert!(report.active.is_none());
    }
}
