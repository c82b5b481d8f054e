//! Application constants for Release Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("release-fetcher/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Accept header for forge API calls
    pub const API_ACCEPT: &str = "application/vnd.github+json";
}

/// Forge API endpoints and repositories
pub mod forge {
    /// Default forge API base URL
    pub const DEFAULT_API_BASE: &str = "https://api.github.com";

    /// Repository publishing firmware releases
    pub const FIRMWARE_REPO: &str = "meshtastic/firmware";

    /// Repository publishing application releases
    pub const APP_REPO: &str = "meshtastic/Meshtastic-Android";

    /// Repository hosting loose-file prerelease builds
    pub const PRERELEASE_REPO: &str = "meshtastic/meshtastic.github.io";

    /// Largest page size the releases/commits endpoints accept
    pub const MAX_PER_PAGE: usize = 100;

    /// Default number of commits scanned for prerelease history
    pub const COMMIT_SCAN_COUNT: usize = 100;

    /// Environment variables consulted for an API token, in order
    pub const TOKEN_ENV_VARS: [&str; 2] = ["RELEASE_FETCHER_TOKEN", "GITHUB_TOKEN"];
}

/// Rate limiting, retry and concurrency limits
pub mod limits {
    /// Default rate limit for forge API requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum retry attempts for failed API requests
    pub const MAX_API_RETRIES: u32 = 3;

    /// Base delay for API exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Default number of transfers in flight
    pub const MAX_CONCURRENT_TRANSFERS: usize = 5;

    /// Default retry attempts per transfer
    pub const MAX_TRANSFER_RETRIES: u32 = 3;

    /// Default fixed delay between transfer attempts (milliseconds)
    pub const TRANSFER_RETRY_DELAY_MS: u64 = 1000;

    /// Number of recent releases scanned beyond the keep window
    pub const RELEASE_SCAN_COUNT: usize = 10;

    /// Upper bound on releases fetched per family
    pub const MAX_RELEASE_FETCH: usize = 100;

    /// Attempts for replacing a destination file after a transient rename failure
    pub const ATOMIC_REPLACE_RETRIES: u32 = 3;

    /// Initial delay between replace attempts (milliseconds)
    pub const ATOMIC_REPLACE_INITIAL_DELAY_MS: u64 = 1000;

    /// Orchestrator passes over families with retryable failures
    pub const PIPELINE_RETRIES: u32 = 1;

    /// Maximum `*` wildcards accepted in an extraction pattern
    pub const MAX_PATTERN_STARS: usize = 5;

    /// Maximum `?` wildcards accepted in an extraction pattern
    pub const MAX_PATTERN_QUESTION_MARKS: usize = 10;
}

/// File operation constants
pub mod files {
    /// Temporary file marker for atomic operations (`<name>.tmp.<suffix>`)
    pub const TEMP_FILE_MARKER: &str = ".tmp.";

    /// Suffix of the SHA-256 sidecar written next to downloaded files
    pub const SHA256_SIDECAR_SUFFIX: &str = ".sha256";

    /// Extensions that receive the executable bit after extraction or download
    pub const EXECUTABLE_EXTENSIONS: [&str; 1] = [".sh"];

    /// Permission bits for executable files (Unix only)
    pub const EXECUTABLE_PERMISSIONS: u32 = 0o755;

    /// Archive extension handled by extraction and integrity checks
    pub const ZIP_EXTENSION: &str = ".zip";

    /// Read buffer used while hashing files
    pub const HASH_BUFFER_SIZE: usize = 64 * 1024;
}

/// On-disk layout of the local mirror
pub mod layout {
    /// Firmware family directory under the download root
    pub const FIRMWARE_DIR: &str = "firmware";

    /// Application family directory under the download root
    pub const APP_DIR: &str = "apks";

    /// Loose-file prerelease directory under the firmware root
    pub const PRERELEASE_DIR: &str = "prerelease";

    /// Repository download directory reserved under the firmware root
    pub const REPO_DOWNLOADS_DIR: &str = "repo-dls";

    /// Prefix of every prerelease directory name
    pub const FIRMWARE_DIR_PREFIX: &str = "firmware-";

    /// Most recently resolved release, one per family
    pub const LATEST_RELEASE_FILE: &str = "latest_release.json";

    /// Loose-file prerelease tracking state
    pub const PRERELEASE_TRACKING_FILE: &str = "prerelease_tracking.json";

    /// Accumulated prerelease directory history
    pub const PRERELEASE_HISTORY_FILE: &str = "prerelease_history.json";

    /// Release lifecycle history, stored as `<family>_release_history.json`
    pub const RELEASE_HISTORY_FILE: &str = "release_history.json";

    /// Metadata cache directory under the download root
    pub const CACHE_DIR: &str = ".cache";
}

/// Metadata cache lifetimes
pub mod cache {
    use super::Duration;

    /// Release listings
    pub const RELEASES_TTL: Duration = Duration::from_secs(60 * 60);

    /// Repository directory listings
    pub const CONTENTS_TTL: Duration = Duration::from_secs(5 * 60);

    /// Commit metadata
    pub const COMMITS_TTL: Duration = Duration::from_secs(2 * 60 * 60);
}

/// Default configuration values
pub mod defaults {
    use super::Duration;

    /// Versions kept per family
    pub const KEEP_COUNT: usize = 2;

    /// Automatic extraction of archive assets
    pub const AUTO_EXTRACT: bool = false;

    /// Default application asset pattern
    pub const APP_INCLUDE_PATTERN: &str = ".apk";

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Host used by the network pre-flight probe
    pub const PROBE_HOST: &str = "api.github.com:443";

    /// Connect timeout of the pre-flight probe
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Config file looked up in the working directory
    pub const LOCAL_CONFIG_FILE: &str = "release-fetcher.toml";

    /// Directory under the user config dir
    pub const CONFIG_DIR_NAME: &str = "release-fetcher";

    /// Download root used when none is configured
    pub const DOWNLOAD_DIR: &str = "downloads";
}

pub use http::USER_AGENT;
pub use layout::{LATEST_RELEASE_FILE, RELEASE_HISTORY_FILE};
