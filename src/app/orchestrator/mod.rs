//! Pipeline orchestration
//!
//! The [`Orchestrator`] owns every component of a run. A run checks the
//! pre-flight gate, processes each enabled family in turn (the loose-file
//! prerelease pass follows the firmware family), re-runs families whose
//! failures are retryable, and records statistics for the run.
//!
//! Failures never abort the pipeline: each one becomes a failed
//! [`DownloadResult`] and the remaining work continues.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::cache::CacheStore;
use crate::app::client::ForgeClient;
use crate::app::downloader::{
    Family, FamilyReport, LatestReleaseRecord, PrereleaseDownloader, PrereleaseTracking, ReleaseDownloader,
};
use crate::app::history::ReleaseHistoryTracker;
use crate::app::signals::Shutdown;
use crate::app::transfer::Transferer;
use crate::app::version::expected_next_version;
use crate::config::AppConfig;
use crate::constants::layout::FIRMWARE_DIR_PREFIX;
use crate::errors::Result;

pub mod preflight;
pub mod results;
pub mod stats;

pub use preflight::{AlwaysProceed, NeverProceed, PreflightConfig, PreflightGate, ReachabilityGate};
pub use results::{DownloadResult, FileType, PipelineOutcome, RetryReport};
pub use stats::{format_duration, DownloadStatistics};

/// Key of the prerelease entry in [`Orchestrator::get_latest_versions`]
pub const FIRMWARE_PRERELEASE_KEY: &str = "firmware_prerelease";

/// Results of the passes over one run, replaced unit by unit on retry
#[derive(Debug, Default)]
struct RunState {
    families: Vec<FamilyReport>,
    prerelease: Vec<DownloadResult>,
    /// Latest firmware release the prerelease pass followed
    prerelease_base: Option<String>,
}

fn retryable_count(results: &[DownloadResult]) -> usize {
    results.iter().filter(|r| !r.success && r.retryable).count()
}

impl RunState {
    fn retryable_failures(&self) -> usize {
        self.families
            .iter()
            .map(|f| retryable_count(&f.results))
            .sum::<usize>()
            + retryable_count(&self.prerelease)
    }

    fn into_outcome(self) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();
        for report in self.families {
            outcome.extend(report.results);
        }
        outcome.extend(self.prerelease);
        outcome
    }
}

/// Coordinates the downloaders of every family
#[derive(Debug)]
pub struct Orchestrator {
    config: AppConfig,
    cache: Arc<CacheStore>,
    client: Arc<ForgeClient>,
    downloaders: Vec<ReleaseDownloader>,
    prerelease: PrereleaseDownloader,
    shutdown: Shutdown,
    preflight: Box<dyn PreflightGate>,
    last_statistics: Mutex<Option<DownloadStatistics>>,
}

impl Orchestrator {
    /// Validate `config` and build every component
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings, or a transfer
    /// error if the HTTP client cannot be built
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_shutdown(config, Shutdown::new())
    }

    /// As [`Orchestrator::new`], observing an existing cancellation handle
    pub fn with_shutdown(config: AppConfig, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(CacheStore::new(config.cache_root(), config.cache.clone()));
        let client = Arc::new(ForgeClient::new(&config.client, Arc::clone(&cache))?);
        let transferer = Transferer::new(
            client.http_client().clone(),
            config.transfer.clone(),
            shutdown.clone(),
        );

        let downloaders = Family::ALL
            .into_iter()
            .map(|family| {
                let history =
                    ReleaseHistoryTracker::new(config.release_history_path(family), family.label());
                ReleaseDownloader::new(
                    family,
                    config.family(family).clone(),
                    &config.download_dir,
                    history,
                    Arc::clone(&client),
                    transferer.clone(),
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let prerelease = PrereleaseDownloader::new(
            config.prerelease.clone(),
            &config.download_dir,
            &config.prerelease_history_path(),
            Arc::clone(&client),
            transferer,
        )?;

        let preflight = config.preflight.gate();
        debug!("Orchestrator configured: {:?}", config);

        Ok(Self {
            config,
            cache,
            client,
            downloaders,
            prerelease,
            shutdown,
            preflight,
            last_statistics: Mutex::new(None),
        })
    }

    /// Replace the pre-flight gate
    pub fn with_preflight(mut self, gate: impl PreflightGate + 'static) -> Self {
        self.preflight = Box::new(gate);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<ForgeClient> {
        &self.client
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    fn enabled_downloaders(&self) -> impl Iterator<Item = &ReleaseDownloader> {
        self.downloaders.iter().filter(|d| d.config().enabled)
    }

    fn downloader(&self, family: Family) -> Option<&ReleaseDownloader> {
        self.downloaders.iter().find(|d| d.family() == family)
    }

    async fn run_family(&self, downloader: &ReleaseDownloader, state: &mut RunState) {
        let family = downloader.family();
        let report = downloader.run().await;
        info!(
            "Finished {} releases: {} result(s), {} kept",
            family,
            report.results.len(),
            report.kept.len()
        );

        if family == Family::Firmware && self.config.prerelease.enabled {
            state.prerelease_base = report.latest.clone();
            self.run_prerelease(state).await;
        }

        match state.families.iter_mut().find(|r| r.family == family) {
            Some(existing) => *existing = report,
            None => state.families.push(report),
        }
    }

    async fn run_prerelease(&self, state: &mut RunState) {
        if self.shutdown.is_triggered() {
            return;
        }
        let Some(latest) = state.prerelease_base.clone() else {
            debug!("No firmware release known, skipping prereleases");
            return;
        };
        let report = self.prerelease.run(&latest).await;
        if let Some(active) = &report.active {
            info!("Active prerelease: {}", active);
        }
        state.prerelease = report.results;
    }

    /// Re-run the units that ended with retryable failures
    async fn retry_failures(&self, state: &mut RunState) -> RetryReport {
        let mut report = RetryReport::default();
        for attempt in 1..=self.config.pipeline_retries {
            let attempted = state.retryable_failures();
            if attempted == 0 || self.shutdown.is_triggered() {
                break;
            }
            if report.passes == 0 {
                report.attempted = attempted;
            }
            report.passes += 1;
            info!(
                "Retrying {} failed download(s), pass {}/{}",
                attempted, attempt, self.config.pipeline_retries
            );

            let families: Vec<_> = state
                .families
                .iter()
                .filter(|r| r.has_retryable_failures())
                .map(|r| r.family)
                .collect();
            let reruns_firmware = families.contains(&Family::Firmware);
            for family in families {
                if let Some(downloader) = self.downloader(family) {
                    self.run_family(downloader, state).await;
                }
            }
            if !reruns_firmware && retryable_count(&state.prerelease) > 0 {
                self.run_prerelease(state).await;
            }

            let still_failing = state.retryable_failures();
            info!(
                "Retry report: {} attempted, {} recovered, {} still failing",
                attempted,
                attempted.saturating_sub(still_failing),
                still_failing
            );
        }
        if report.passes > 0 {
            report.still_failing = state.retryable_failures();
            report.recovered = report.attempted.saturating_sub(report.still_failing);
        }
        report
    }

    /// Run every enabled family and the prerelease pass
    ///
    /// # Errors
    ///
    /// Fails only when the download directory cannot be created; all
    /// per-file failures are reported in the outcome.
    pub async fn run_download_pipeline(&self) -> Result<PipelineOutcome> {
        let started = Instant::now();
        info!("Starting download pipeline");

        if !self.preflight.should_proceed().await {
            warn!("Pre-flight check failed, skipping all downloads");
            let outcome = PipelineOutcome::aborted();
            self.store_statistics(&outcome);
            return Ok(outcome);
        }

        tokio::fs::create_dir_all(&self.config.download_dir).await?;

        let mut state = RunState::default();
        for downloader in self.enabled_downloaders() {
            if self.shutdown.is_triggered() {
                info!("Cancellation requested, stopping before {}", downloader.family());
                break;
            }
            self.run_family(downloader, &mut state).await;
        }
        if !self.config.firmware.enabled && self.config.prerelease.enabled {
            debug!("Prerelease downloads follow the firmware family, which is disabled");
        }

        let retry = self.retry_failures(&mut state).await;

        let mut outcome = state.into_outcome();
        outcome.retry = retry;
        outcome.cancelled = self.shutdown.is_triggered();
        outcome.duration = started.elapsed();

        let stats = self.store_statistics(&outcome);
        for failure in &outcome.failures {
            warn!(
                "Failed: {} {} ({})",
                failure.release_tag,
                failure.file_path.display(),
                failure.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        info!("Download pipeline finished: {}", stats.summary());
        Ok(outcome)
    }

    fn store_statistics(&self, outcome: &PipelineOutcome) -> DownloadStatistics {
        let stats = DownloadStatistics::from_outcome(outcome);
        let mut slot = self
            .last_statistics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(stats.clone());
        stats
    }

    /// Statistics of the most recent run; empty before the first run
    pub fn get_download_statistics(&self) -> DownloadStatistics {
        self.last_statistics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_default()
    }

    /// Latest recorded version per family, plus the tracked prerelease
    ///
    /// Reads local state only.
    pub async fn get_latest_versions(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        for downloader in &self.downloaders {
            if let Some(record) = LatestReleaseRecord::load(&downloader.latest_release_path()).await {
                versions.insert(downloader.family().as_str().to_string(), record.latest_version);
            }
        }

        let tracking = PrereleaseTracking::load(self.prerelease.tracking_path()).await;
        if let Some(latest) = tracking.commits.last() {
            let id = latest.strip_prefix(FIRMWARE_DIR_PREFIX).unwrap_or(latest);
            versions.insert(FIRMWARE_PRERELEASE_KEY.to_string(), id.to_string());
        }
        versions
    }

    /// Prune version directories outside each family's keep window
    ///
    /// Families whose release listing cannot be fetched are left untouched.
    pub async fn cleanup_old_versions(&self) -> Result<Vec<PathBuf>> {
        info!("Cleaning up old versions");
        let mut removed = Vec::new();

        for downloader in self.enabled_downloaders() {
            let releases = match downloader.fetch_releases().await {
                Ok(releases) if !releases.is_empty() => releases,
                Ok(_) => {
                    info!("No {} releases listed, nothing pruned", downloader.family());
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {} cleanup: {}", downloader.family(), e);
                    continue;
                }
            };
            let kept: Vec<String> = downloader
                .select_releases_to_keep(&releases)
                .into_iter()
                .map(|r| r.tag_name)
                .collect();
            removed.extend(downloader.cleanup(&kept).await);
        }

        if self.config.prerelease.enabled {
            removed.extend(self.cleanup_prereleases().await);
        }

        info!("Old version cleanup completed, {} directories removed", removed.len());
        Ok(removed)
    }

    async fn cleanup_prereleases(&self) -> Vec<PathBuf> {
        let Some(firmware) = self.downloader(Family::Firmware) else {
            return Vec::new();
        };
        let Some(record) = LatestReleaseRecord::load(&firmware.latest_release_path()).await else {
            return Vec::new();
        };
        let Some(expected) = expected_next_version(&record.latest_version) else {
            return Vec::new();
        };

        match self.prerelease.resolve_directory(&expected).await {
            Ok(active) => self.prerelease.prune(active.as_deref()).await,
            Err(e) => {
                warn!("Skipping prerelease cleanup: {}", e);
                Vec::new()
            }
        }
    }
}
