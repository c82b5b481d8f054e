//! Concurrency-bounded, retrying file transfers
//!
//! Every transfer streams into a sibling temp file and is renamed over the
//! destination only after the full body arrived with the expected size and
//! digest. A shared semaphore caps the number of transfers in flight; a
//! permit is held for one attempt, never across a retry sleep.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::client::http::status_error;
use crate::app::files::atomic::{replace_file, temp_path_for, ReplacePolicy};
use crate::app::hash::Sha256Digest;
use crate::app::signals::Shutdown;
use crate::constants::limits;
use crate::errors::{DownloadError, TransferResult};

/// Transfer concurrency and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Transfers in flight at once
    pub max_concurrent: usize,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: limits::MAX_CONCURRENT_TRANSFERS,
            max_retries: limits::MAX_TRANSFER_RETRIES,
            retry_delay: Duration::from_millis(limits::TRANSFER_RETRY_DELAY_MS),
        }
    }
}

impl TransferConfig {
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// One file to fetch
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
    pub expected_digest: Option<Sha256Digest>,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_size: None,
            expected_digest: None,
        }
    }

    pub fn with_expected(mut self, size: Option<u64>, digest: Option<Sha256Digest>) -> Self {
        self.expected_size = size.filter(|s| *s > 0);
        self.expected_digest = digest;
        self
    }
}

/// A completed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferredFile {
    pub bytes: u64,
    pub digest: Sha256Digest,
}

/// Final result of a transfer and how many retries it took
#[derive(Debug)]
pub struct TransferOutcome {
    pub result: TransferResult<TransferredFile>,
    pub retries: u32,
}

/// Shared transfer primitive
#[derive(Debug, Clone)]
pub struct Transferer {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    config: TransferConfig,
    replace_policy: ReplacePolicy,
    shutdown: Shutdown,
}

impl Transferer {
    pub fn new(client: reqwest::Client, config: TransferConfig, shutdown: Shutdown) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
            replace_policy: ReplacePolicy::default(),
            shutdown,
        }
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Single attempt: stream `url` into `destination`
    ///
    /// # Errors
    ///
    /// Returns the classified `DownloadError`; the destination is untouched
    /// on any failure
    pub async fn transfer(
        &self,
        request: &TransferRequest,
        progress: Option<&ProgressBar>,
    ) -> TransferResult<TransferredFile> {
        let url = Url::parse(&request.url).map_err(|e| DownloadError::InvalidUrl {
            url: request.url.clone(),
            error: e.to_string(),
        })?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| DownloadError::Cancelled)?;
        if self.shutdown.is_triggered() {
            return Err(DownloadError::Cancelled);
        }

        let response = tokio::select! {
            response = self.client.get(url.as_str()).send() => response?,
            _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
        };
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, &response));
        }

        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(&request.destination);
        match self.stream_to(response, &temp_path, progress).await {
            Ok(file) => {
                if let Err(e) = check_expected(request, &file) {
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e);
                }
                replace_file(&temp_path, &request.destination, self.replace_policy)
                    .await
                    .map_err(|e| {
                        warn!("Could not place {}: {}", request.destination.display(), e);
                        DownloadError::AtomicOperationFailed {
                            temp_path: temp_path.clone(),
                            final_path: request.destination.clone(),
                        }
                    })?;
                debug!(
                    "Downloaded {} ({} bytes)",
                    request.destination.display(),
                    file.bytes
                );
                Ok(file)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        mut response: reqwest::Response,
        temp_path: &Path,
        progress: Option<&ProgressBar>,
    ) -> TransferResult<TransferredFile> {
        let mut file = File::create(temp_path).await?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk?,
                _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
            };
            let Some(chunk) = chunk else {
                break;
            };

            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            if let Some(bar) = progress {
                bar.inc(chunk.len() as u64);
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(TransferredFile {
            bytes,
            digest: Sha256Digest::from_bytes(hasher.finalize().into()),
        })
    }

    /// Transfer with fixed-delay retries of retryable failures
    ///
    /// No attempt starts once the run is cancelled; the last error is
    /// returned unchanged when retries are exhausted.
    pub async fn transfer_with_retry(
        &self,
        request: &TransferRequest,
        progress: Option<&ProgressBar>,
    ) -> TransferOutcome {
        let mut retries = 0;
        loop {
            if self.shutdown.is_triggered() {
                return TransferOutcome {
                    result: Err(DownloadError::Cancelled),
                    retries,
                };
            }

            let error = match self.transfer(request, progress).await {
                Ok(file) => {
                    return TransferOutcome {
                        result: Ok(file),
                        retries,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() || retries >= self.config.max_retries {
                return TransferOutcome {
                    result: Err(error),
                    retries,
                };
            }

            retries += 1;
            warn!(
                "Transfer of {} failed (attempt {}/{}): {}. Retrying in {}ms",
                request.url,
                retries,
                self.config.max_retries + 1,
                error,
                self.config.retry_delay.as_millis()
            );
            if let Some(bar) = progress {
                bar.set_position(0);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_delay) => {}
                _ = self.shutdown.cancelled() => {
                    return TransferOutcome {
                        result: Err(DownloadError::Cancelled),
                        retries,
                    };
                }
            }
        }
    }

    /// Run a batch concurrently, bounded by the shared limiter
    ///
    /// Outcomes are returned in request order.
    pub async fn transfer_all(&self, requests: &[TransferRequest]) -> Vec<TransferOutcome> {
        if requests.is_empty() {
            return Vec::new();
        }
        info!("Transferring {} file(s)", requests.len());

        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| async move {
                (index, self.transfer_with_retry(request, None).await)
            })
            .collect();

        let mut outcomes: Vec<Option<TransferOutcome>> = Vec::new();
        outcomes.resize_with(requests.len(), || None);
        while let Some((index, outcome)) = pending.next().await {
            outcomes[index] = Some(outcome);
        }

        outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or(TransferOutcome {
                    result: Err(DownloadError::Cancelled),
                    retries: 0,
                })
            })
            .collect()
    }
}

fn check_expected(request: &TransferRequest, file: &TransferredFile) -> TransferResult<()> {
    if let Some(expected) = request.expected_size {
        if file.bytes != expected {
            return Err(DownloadError::IncompleteDownload {
                received: file.bytes,
                expected,
            });
        }
    }
    if let Some(expected) = request.expected_digest {
        if file.digest != expected {
            return Err(DownloadError::HashMismatch {
                path: request.destination.clone(),
                expected: expected.to_hex(),
                actual: file.digest.to_hex(),
            });
        }
    }
    Ok(())
}
