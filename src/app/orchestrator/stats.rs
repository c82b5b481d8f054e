//! Download statistics for a pipeline run

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::results::{FileType, PipelineOutcome};

/// Aggregated counts of the most recent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatistics {
    /// Attempted transfers and extractions (skipped results excluded)
    pub total_downloads: usize,
    /// Files written during the run
    pub successful_downloads: usize,
    /// Files already present or deliberately not fetched
    pub skipped_downloads: usize,
    pub failed_downloads: usize,
    /// Percentage of attempts that succeeded; 100.0 when nothing was attempted
    pub success_rate: f64,
    /// Files written per file type
    pub by_file_type: BTreeMap<String, usize>,
    pub aborted: bool,
    pub cancelled: bool,
    pub duration: Duration,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for DownloadStatistics {
    fn default() -> Self {
        Self {
            total_downloads: 0,
            successful_downloads: 0,
            skipped_downloads: 0,
            failed_downloads: 0,
            success_rate: 100.0,
            by_file_type: FileType::ALL
                .iter()
                .map(|t| (t.as_str().to_string(), 0))
                .collect(),
            aborted: false,
            cancelled: false,
            duration: Duration::ZERO,
            finished_at: None,
        }
    }
}

impl DownloadStatistics {
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        let mut stats = Self {
            successful_downloads: outcome.downloaded().count(),
            skipped_downloads: outcome.skipped().count(),
            failed_downloads: outcome.failures.len(),
            aborted: outcome.aborted,
            cancelled: outcome.cancelled,
            duration: outcome.duration,
            finished_at: Some(Utc::now()),
            ..Self::default()
        };
        stats.total_downloads = stats.successful_downloads + stats.failed_downloads;

        for result in outcome.downloaded() {
            *stats
                .by_file_type
                .entry(result.file_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        if stats.total_downloads > 0 {
            stats.success_rate =
                stats.successful_downloads as f64 / stats.total_downloads as f64 * 100.0;
        }
        stats
    }

    pub fn count(&self, file_type: FileType) -> usize {
        self.by_file_type.get(file_type.as_str()).copied().unwrap_or(0)
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        if self.aborted {
            return "Run aborted by pre-flight check".to_string();
        }
        let mut line = format!(
            "{} downloaded, {} skipped, {} failed ({:.1}% success) in {}",
            self.successful_downloads,
            self.skipped_downloads,
            self.failed_downloads,
            self.success_rate,
            format_duration(self.duration)
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}

/// Format a duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
