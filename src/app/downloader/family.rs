//! Artifact families and their per-family settings

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app::static_regex;
use crate::constants::{defaults, forge, layout};

static VERSION_DIR_RX: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"^(?:[vV]\d+(?:\.\d+)*|\d+(?:\.\d+)+)(?:[-.]?(?:dev|alpha|beta|rc)\.?\d*)?(?:\.[0-9a-fA-F]{6,})?$",
    )
});

/// A family of artifacts published by one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Firmware,
    App,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Firmware, Family::App];

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Firmware => "firmware",
            Family::App => "app",
        }
    }

    /// Capitalized name for log lines
    pub fn label(self) -> &'static str {
        match self {
            Family::Firmware => "Firmware",
            Family::App => "App",
        }
    }

    /// Directory below the download root
    pub fn dir_name(self) -> &'static str {
        match self {
            Family::Firmware => layout::FIRMWARE_DIR,
            Family::App => layout::APP_DIR,
        }
    }

    pub fn default_repo(self) -> &'static str {
        match self {
            Family::Firmware => forge::FIRMWARE_REPO,
            Family::App => forge::APP_REPO,
        }
    }

    /// Asset selection used when no include patterns are configured
    pub fn default_include_patterns(self) -> Vec<String> {
        match self {
            Family::Firmware => Vec::new(),
            Family::App => vec![defaults::APP_INCLUDE_PATTERN.to_string()],
        }
    }

    /// Subdirectories owned by other parts of the pipeline
    pub fn reserved_dirs(self) -> &'static [&'static str] {
        match self {
            Family::Firmware => &[layout::PRERELEASE_DIR, layout::REPO_DOWNLOADS_DIR],
            Family::App => &[],
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a directory name follows the version naming convention
///
/// The whole name must be a version: an optional prerelease keyword and
/// build hash may follow the numbers, nothing else. Only such directories
/// are ever pruned; anything else under a family root belongs to the user.
pub fn is_version_directory(name: &str) -> bool {
    VERSION_DIR_RX.is_match(name)
}

/// Directory name for a release tag
pub fn release_dir_name(tag: &str) -> String {
    tag.trim().replace(['/', '\\'], "_")
}

/// Settings for one artifact family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyConfig {
    pub enabled: bool,
    /// `owner/name`; the family default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Versions kept on disk
    pub keep_count: usize,
    /// Asset names to download (substring or glob)
    pub include_patterns: Vec<String>,
    /// Asset names never downloaded (glob)
    pub exclude_patterns: Vec<String>,
    /// Extract matching entries from downloaded zip assets
    pub auto_extract: bool,
    pub extract_patterns: Vec<String>,
    pub extract_exclude_patterns: Vec<String>,
    /// Also keep the newest alpha/beta release
    pub keep_last_prerelease: bool,
    /// Fill the keep window with non-revoked releases
    pub filter_revoked: bool,
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo: None,
            keep_count: defaults::KEEP_COUNT,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            auto_extract: defaults::AUTO_EXTRACT,
            extract_patterns: Vec::new(),
            extract_exclude_patterns: Vec::new(),
            keep_last_prerelease: false,
            filter_revoked: true,
        }
    }
}

impl FamilyConfig {
    pub fn repo_for(&self, family: Family) -> String {
        self.repo
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(family.default_repo())
            .to_string()
    }

    pub fn include_patterns_for(&self, family: Family) -> Vec<String> {
        if self.include_patterns.is_empty() {
            family.default_include_patterns()
        } else {
            self.include_patterns.clone()
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count;
        self
    }

    pub fn with_include_patterns<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.include_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extraction<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.auto_extract = true;
        self.extract_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Number of releases to request from the forge
    pub fn scan_count(&self) -> usize {
        use crate::constants::limits::{MAX_RELEASE_FETCH, RELEASE_SCAN_COUNT};

        let mut count = self.keep_count.max(RELEASE_SCAN_COUNT);
        if self.filter_revoked {
            count += RELEASE_SCAN_COUNT;
        }
        count.min(MAX_RELEASE_FETCH)
    }
}
