//! Configuration management for Release Fetcher
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! environment variables, then command-line overrides. Every section is
//! optional in the file; missing keys keep their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::ClientConfig;
use crate::app::downloader::{Family, FamilyConfig, PrereleaseConfig};
use crate::app::files::patterns::validate_extraction_patterns;
use crate::app::files::PatternFilter;
use crate::app::orchestrator::preflight::PreflightConfig;
use crate::app::transfer::TransferConfig;
use crate::constants::{defaults, forge, layout, limits};
use crate::errors::{ConfigError, ConfigResult};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Unified application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the local mirror
    pub download_dir: PathBuf,
    /// Orchestrator passes over families with retryable failures
    pub pipeline_retries: u32,
    pub firmware: FamilyConfig,
    pub app: FamilyConfig,
    pub prerelease: PrereleaseConfig,
    pub client: ClientConfig,
    pub transfer: TransferConfig,
    pub cache: CacheConfig,
    pub preflight: PreflightConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            pipeline_retries: limits::PIPELINE_RETRIES,
            firmware: FamilyConfig::default(),
            app: FamilyConfig::default(),
            prerelease: PrereleaseConfig::default(),
            client: ClientConfig::default(),
            transfer: TransferConfig::default(),
            cache: CacheConfig::default(),
            preflight: PreflightConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join(defaults::CONFIG_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(defaults::DOWNLOAD_DIR))
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, else the first standard location found)
    /// 3. Environment variables (API token)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when an explicit file does not exist,
    /// or a read/parse error for an existing file
    pub async fn load(config_file_override: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_token_from(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Standard locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(defaults::LOCAL_CONFIG_FILE)];
        if let Ok(path) = Self::default_config_path() {
            paths.push(path);
        }
        paths
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|path| {
            let found = path.is_file();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// The config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::MissingField {
            field: "user config directory".to_string(),
        })?;
        Ok(config_dir.join(defaults::CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Use the first non-empty token variable unless a token is configured
    pub fn apply_token_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.client.token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return;
        }
        let token = forge::TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty());
        if token.is_some() {
            debug!("Using API token from environment");
            self.client = self.client.clone().with_token(token);
        }
    }

    pub fn with_download_dir(mut self, download_dir: impl Into<PathBuf>) -> Self {
        self.download_dir = download_dir.into();
        self
    }

    pub fn family(&self, family: Family) -> &FamilyConfig {
        match family {
            Family::Firmware => &self.firmware,
            Family::App => &self.app,
        }
    }

    pub fn family_mut(&mut self, family: Family) -> &mut FamilyConfig {
        match family {
            Family::Firmware => &mut self.firmware,
            Family::App => &mut self.app,
        }
    }

    /// Metadata cache directory
    pub fn cache_root(&self) -> PathBuf {
        self.cache
            .cache_root
            .clone()
            .unwrap_or_else(|| self.download_dir.join(layout::CACHE_DIR))
    }

    /// Per-family release history file
    pub fn release_history_path(&self, family: Family) -> PathBuf {
        self.cache_root()
            .join(format!("{}_{}", family.as_str(), layout::RELEASE_HISTORY_FILE))
    }

    pub fn prerelease_history_path(&self) -> PathBuf {
        self.cache_root().join(layout::PRERELEASE_HISTORY_FILE)
    }

    /// Check the configuration before any network call
    ///
    /// # Errors
    ///
    /// `MissingField` for an empty download directory, otherwise
    /// `ValidationFailed` listing every problem found
    pub fn validate(&self) -> ConfigResult<()> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "download_dir".to_string(),
            });
        }

        let mut errors = Vec::new();

        if self.transfer.max_concurrent == 0 {
            errors.push("transfer.max_concurrent must be at least 1".to_string());
        }
        if self.client.rate_limit_rps == 0 {
            errors.push("client.rate_limit_rps must be at least 1".to_string());
        }
        if let Err(e) = url::Url::parse(&self.client.api_base_url) {
            errors.push(format!(
                "client.api_base_url {:?} is not a valid URL: {}",
                self.client.api_base_url, e
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "logging.level {:?} must be one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        for family in Family::ALL {
            let config = self.family(family);
            if config.auto_extract && config.extract_patterns.iter().all(|p| p.trim().is_empty()) {
                errors.push(format!(
                    "{}.auto_extract is set but extract_patterns is empty",
                    family
                ));
            }
            if let Err(e) =
                validate_extraction_patterns(&config.extract_patterns, &config.extract_exclude_patterns)
            {
                errors.push(format!("{}: {}", family, e));
            }
            if let Err(e) = PatternFilter::new(&config.include_patterns, &config.exclude_patterns) {
                errors.push(format!("{}: {}", family, e));
            }
        }

        if self.prerelease.enabled {
            if self.prerelease.repo.trim().is_empty() {
                errors.push("prerelease.repo must not be empty".to_string());
            }
            if self.prerelease.commit_scan_count == 0 {
                errors.push("prerelease.commit_scan_count must be at least 1".to_string());
            }
            if let Err(e) =
                PatternFilter::new(&self.prerelease.include_patterns, &self.prerelease.exclude_patterns)
            {
                errors.push(format!("prerelease: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Current settings as TOML, token redacted
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        let mut shown = self.clone();
        if shown.client.token.is_some() {
            shown.client.token = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })
    }

    /// Write the commented default file to `path`
    ///
    /// An existing file is left alone unless `force` is set. Returns true
    /// when the file was written.
    pub async fn write_default_config(path: &Path, force: bool) -> ConfigResult<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        let io_error = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(io_error)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(true)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        let download_dir = default_download_dir();
        let download_dir = download_dir.to_string_lossy().replace('\\', "/");

        format!(
            r#"# Release Fetcher Configuration
# Every key is optional; removing one restores its default.

# Root of the local mirror
download_dir = "{download_dir}"

# Extra passes over families whose downloads failed with a retryable error
pipeline_retries = {pipeline_retries}

[firmware]
enabled = true
# repo = "{firmware_repo}"
keep_count = {keep_count}
# Asset names to download (substring or glob); empty downloads every asset
include_patterns = []
exclude_patterns = ["*debug*"]
# Extract matching files from downloaded zip archives
auto_extract = false
extract_patterns = []
extract_exclude_patterns = []
# Also keep the newest alpha/beta release
keep_last_prerelease = false
# Fill the keep window with releases that were not revoked
filter_revoked = true

[app]
enabled = true
# repo = "{app_repo}"
keep_count = {keep_count}
include_patterns = ["{app_pattern}"]
exclude_patterns = []

[prerelease]
# Mirror loose-file firmware prereleases that follow the latest release
enabled = false
repo = "{prerelease_repo}"
include_patterns = []
exclude_patterns = []
commit_scan_count = {commit_scan_count}

[client]
api_base_url = "{api_base}"
# token = "..."  # or set RELEASE_FETCHER_TOKEN / GITHUB_TOKEN
request_timeout = "30s"
connect_timeout = "10s"
rate_limit_rps = {rate_limit}

[transfer]
max_concurrent = {max_concurrent}
max_retries = {max_retries}
retry_delay = "1s"

[cache]
# cache_root = "/path/to/cache"  # default: <download_dir>/.cache
releases_ttl = "1h"
contents_ttl = "5m"
commits_ttl = "2h"

[preflight]
# Skip the run when the probe host cannot be reached
require_network = false
probe_host = "{probe_host}"
probe_timeout = "5s"

[logging]
level = "{log_level}"  # error, warn, info, debug, trace
"#,
            download_dir = download_dir,
            pipeline_retries = limits::PIPELINE_RETRIES,
            firmware_repo = forge::FIRMWARE_REPO,
            app_repo = forge::APP_REPO,
            keep_count = defaults::KEEP_COUNT,
            app_pattern = defaults::APP_INCLUDE_PATTERN,
            prerelease_repo = forge::PRERELEASE_REPO,
            commit_scan_count = forge::COMMIT_SCAN_COUNT,
            api_base = forge::DEFAULT_API_BASE,
            rate_limit = limits::DEFAULT_RATE_LIMIT_RPS,
            max_concurrent = limits::MAX_CONCURRENT_TRANSFERS,
            max_retries = limits::MAX_TRANSFER_RETRIES,
            probe_host = defaults::PROBE_HOST,
            log_level = defaults::LOG_LEVEL,
        )
    }
}
