//! Prelude module for Release Fetcher
//!
//! Re-exports the items needed for typical library use with a single
//! `use release_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use release_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let outcome = orchestrator.run_download_pipeline().await?;
//!     println!("{}", orchestrator.get_download_statistics().summary());
//!     assert!(!outcome.aborted);
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ErrorKind, Result};

// Configuration
pub use crate::config::AppConfig;

// Orchestration and results
pub use crate::app::orchestrator::{
    DownloadResult, DownloadStatistics, FileType, Orchestrator, PipelineOutcome, PreflightGate,
};
pub use crate::app::signals::Shutdown;

// Building blocks for custom pipelines
pub use crate::app::{
    CacheConfig, CacheStore, Channel, ClientConfig, Family, ForgeClient, Release, ReleaseDownloader,
    ReleaseStatus, TransferConfig, Transferer,
};
pub use crate::app::downloader::FamilyConfig;

// Version ordering
pub use crate::app::version::{compare, expected_next_version, extract_base_version, normalize};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        // Verify that all essential types are available through prelude
        let _config = AppConfig::default();
        let _client_config = ClientConfig::default();
        let _transfer_config = TransferConfig::default();
        let _family_config = FamilyConfig::default();

        assert_eq!(Family::ALL.len(), 2);
        assert_eq!(compare("v2.7.14", "v2.7.13"), std::cmp::Ordering::Greater);
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::default().with_download_dir(temp_dir.path());

        let orchestrator = Orchestrator::new(config).unwrap();
        assert_eq!(orchestrator.get_download_statistics().total_downloads, 0);
        assert!(orchestrator.get_latest_versions().await.is_empty());
    }
}
