//! Forge API data models
//!
//! Field names follow the GitHub REST API so responses deserialize directly;
//! the same types are written to the metadata cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::Sha256Digest;

/// A formally published release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Forge-reported prerelease flag; informational only
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            name: None,
            body: None,
            published_at: None,
            prerelease: false,
            assets: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn notes(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// Published content hash, `sha256:<hex>`
    #[serde(default)]
    pub digest: Option<String>,
}

impl Asset {
    /// Published SHA-256, ignoring other or malformed digests
    pub fn sha256(&self) -> Option<Sha256Digest> {
        self.digest
            .as_deref()
            .filter(|d| d.to_ascii_lowercase().starts_with("sha256:"))
            .and_then(|d| Sha256Digest::from_hex(d).ok())
    }
}

/// Entry of a repository directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ContentEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == "dir"
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == "file"
    }
}

/// Commit metadata relevant to prerelease discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Commit object as returned by the commits endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    committer: Option<ApiSignature>,
    #[serde(default)]
    author: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

impl From<ApiCommit> for Commit {
    fn from(api: ApiCommit) -> Self {
        let committed_at = api
            .commit
            .committer
            .and_then(|c| c.date)
            .or_else(|| api.commit.author.and_then(|a| a.date));
        Self {
            sha: api.sha,
            message: api.commit.message,
            committed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_from_api_json() {
        let json = r#"{
            "tag_name": "v2.7.13.597fa0b",
            "name": "Meshtastic Firmware 2.7.13.597fa0b Beta",
            "body": null,
            "published_at": "2025-10-01T12:00:00Z",
            "prerelease": false,
            "html_url": "https://example.invalid/ignored",
            "assets": [{
                "name": "firmware-rak4631-2.7.13.597fa0b.zip",
                "browser_download_url": "https://example.invalid/fw.zip",
                "size": 1024,
                "digest": "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            }]
        }"#;

        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v2.7.13.597fa0b");
        assert_eq!(release.notes(), "");
        assert!(release.published_at.is_some());
        assert_eq!(release.assets[0].size, Some(1024));
        assert_eq!(
            release.assets[0].sha256(),
            Some(Sha256Digest::of_bytes(b"hello"))
        );
    }

    #[test]
    fn test_non_sha256_digest_ignored() {
        let asset = Asset {
            name: "a.bin".to_string(),
            browser_download_url: "https://example.invalid/a.bin".to_string(),
            size: None,
            digest: Some("md5:50c9d1c465f3cbff652be1509c2e2a4e".to_string()),
        };
        assert!(asset.sha256().is_none());
    }

    #[test]
    fn test_commit_from_api_json() {
        let json = r#"[{
            "sha": "abc123",
            "commit": {
                "message": "2.7.14.e959000 meshtastic/firmware@e959000",
                "committer": {"name": "bot", "date": "2025-10-02T08:30:00Z"}
            }
        }]"#;

        let commits: Vec<ApiCommit> = serde_json::from_str(json).unwrap();
        let commit: Commit = commits.into_iter().next().unwrap().into();
        assert_eq!(commit.sha, "abc123");
        assert!(commit.message.starts_with("2.7.14.e959000"));
        assert!(commit.committed_at.is_some());
    }

    #[test]
    fn test_content_entry_types() {
        let json = r#"[
            {"name": "firmware-2.7.14.e959000", "path": "firmware-2.7.14.e959000", "type": "dir"},
            {"name": "index.html", "path": "index.html", "type": "file",
             "download_url": "https://example.invalid/index.html", "size": 10}
        ]"#;

        let entries: Vec<ContentEntry> = serde_json::from_str(json).unwrap();
        assert!(entries[0].is_dir());
        assert!(entries[1].is_file());
        assert_eq!(entries[1].size, Some(10));
    }
}
