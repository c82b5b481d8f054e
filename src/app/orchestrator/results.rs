//! Per-file results and the run outcome

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::downloader::Family;
use crate::errors::ErrorKind;

/// What a result refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Firmware,
    App,
    FirmwarePrerelease,
    Extraction,
}

impl FileType {
    pub const ALL: [FileType; 4] = [
        FileType::Firmware,
        FileType::App,
        FileType::FirmwarePrerelease,
        FileType::Extraction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Firmware => "firmware",
            FileType::App => "app",
            FileType::FirmwarePrerelease => "firmware_prerelease",
            FileType::Extraction => "extraction",
        }
    }

    pub fn for_family(family: Family) -> Self {
        match family {
            Family::Firmware => FileType::Firmware,
            Family::App => FileType::App,
        }
    }
}

/// Outcome of one asset download or extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub family: Family,
    pub release_tag: String,
    pub file_path: PathBuf,
    pub file_type: FileType,
    pub success: bool,
    pub was_skipped: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub retry_count: u32,
}

impl DownloadResult {
    fn base(family: Family, tag: &str, path: &Path, file_type: FileType) -> Self {
        Self {
            family,
            release_tag: tag.to_string(),
            file_path: path.to_path_buf(),
            file_type,
            success: true,
            was_skipped: false,
            error_kind: None,
            error_message: None,
            retryable: false,
            retry_count: 0,
        }
    }

    /// File written by this run
    pub fn completed(family: Family, tag: &str, path: &Path, file_type: FileType, retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Self::base(family, tag, path, file_type)
        }
    }

    /// Nothing to do: already present and valid, or deliberately not fetched
    pub fn skipped(family: Family, tag: &str, path: &Path, file_type: FileType) -> Self {
        Self {
            was_skipped: true,
            ..Self::base(family, tag, path, file_type)
        }
    }

    pub fn failed(
        family: Family,
        tag: &str,
        path: &Path,
        file_type: FileType,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            retryable: kind.is_retryable(),
            ..Self::base(family, tag, path, file_type)
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Override the retry decision derived from the error kind
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_downloaded(&self) -> bool {
        self.success && !self.was_skipped
    }
}

/// Totals of the orchestrator-level retry passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Passes actually run
    pub passes: u32,
    /// Retryable failures going into the passes
    pub attempted: usize,
    pub recovered: usize,
    pub still_failing: usize,
}

/// Everything a pipeline run produced
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub successes: Vec<DownloadResult>,
    pub failures: Vec<DownloadResult>,
    /// The pre-flight gate declined the run
    pub aborted: bool,
    /// Cancellation was requested during the run
    pub cancelled: bool,
    pub duration: Duration,
    pub retry: RetryReport,
}

impl PipelineOutcome {
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn push(&mut self, result: DownloadResult) {
        if result.success {
            self.successes.push(result);
        } else {
            self.failures.push(result);
        }
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = DownloadResult>) {
        for result in results {
            self.push(result);
        }
    }

    pub fn downloaded(&self) -> impl Iterator<Item = &DownloadResult> {
        self.successes.iter().filter(|r| !r.was_skipped)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DownloadResult> {
        self.successes.iter().filter(|r| r.was_skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_retryability_follows_kind() {
        let path = Path::new("/tmp/firmware/v1.0.0/fw.zip");
        let network = DownloadResult::failed(
            Family::Firmware,
            "v1.0.0",
            path,
            FileType::Firmware,
            ErrorKind::NetworkError,
            "connection reset",
        );
        assert!(network.retryable);
        assert!(!network.success);

        let missing = DownloadResult::failed(
            Family::Firmware,
            "v1.0.0",
            path,
            FileType::Firmware,
            ErrorKind::HttpClientError,
            "HTTP 404",
        );
        assert!(!missing.retryable);
        assert!(missing.clone().with_retryable(true).retryable);
    }

    #[test]
    fn test_outcome_partitions_results() {
        let path = Path::new("fw.zip");
        let mut outcome = PipelineOutcome::default();
        outcome.extend([
            DownloadResult::completed(Family::App, "v1", path, FileType::App, 1),
            DownloadResult::skipped(Family::App, "v1", path, FileType::App),
            DownloadResult::failed(Family::App, "v1", path, FileType::App, ErrorKind::Timeout, "slow"),
        ]);

        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.downloaded().count(), 1);
        assert_eq!(outcome.skipped().count(), 1);
        assert!(!outcome.aborted);
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let result = DownloadResult::failed(
            Family::Firmware,
            "v1",
            Path::new("fw.zip"),
            FileType::FirmwarePrerelease,
            ErrorKind::CorruptedFile,
            "bad zip",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["file_type"], "firmware_prerelease");
        assert_eq!(json["error_kind"], "corrupted_file");
        assert_eq!(json["family"], "firmware");
    }
}
