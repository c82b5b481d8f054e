//! Core application logic for Release Fetcher
//!
//! This module contains the release-resolution engine: version ordering,
//! the metadata cache, the forge API client, release and prerelease history,
//! file and archive operations, the transfer core, the per-family downloaders
//! and the orchestrator that sequences them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use release_fetcher::app::Orchestrator;
//! use release_fetcher::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let orchestrator = Orchestrator::new(config)?;
//! let outcome = orchestrator.run_download_pipeline().await?;
//! println!("{} downloaded, {} failed", outcome.successes.len(), outcome.failures.len());
//! # Ok(())
//! # }
//! ```

use regex::Regex;

pub mod cache;
pub mod client;
pub mod downloader;
pub mod files;
pub mod hash;
pub mod history;
pub mod orchestrator;
pub mod signals;
pub mod transfer;
pub mod version;

// Re-export main public API
pub use cache::{CacheConfig, CacheKind, CacheStore};
pub use client::{Asset, ClientConfig, ForgeClient, Release};
pub use downloader::{Family, ReleaseDownloader};
pub use hash::Sha256Digest;
pub use history::{Channel, ReleaseHistoryTracker, ReleaseStatus};
pub use orchestrator::{DownloadResult, Orchestrator, PipelineOutcome};
pub use signals::Shutdown;
pub use transfer::{TransferConfig, Transferer};
pub use version::{compare, expected_next_version, extract_base_version, normalize};

/// Compile a regex literal shipped with the binary
///
/// Only called with constant patterns; a failure is a programming error.
pub(crate) fn static_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => panic!("invalid built-in regex {:?}: {}", pattern, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(compare("2.0.0", "1.0.0"), std::cmp::Ordering::Greater);
    }
}
