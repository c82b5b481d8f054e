//! Forge API client
//!
//! Release listings, repository directory listings and commit metadata are
//! fetched through one rate-limited HTTP handler and cached in the
//! [`CacheStore`]; a fresh cache entry answers a call without any request.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with resilience patterns
//! - `models`: Release, asset, content and commit types

use std::sync::Arc;

use url::Url;

use crate::app::cache::{CacheKind, CacheStore};
use crate::constants::forge;
use crate::errors::{DownloadError, TransferResult};

pub mod config;
pub mod http;
pub mod models;

pub use config::ClientConfig;
pub use models::{Asset, Commit, ContentEntry, Release};

use http::HttpHandler;
use models::ApiCommit;

/// Client for the release, contents and commits endpoints
#[derive(Debug)]
pub struct ForgeClient {
    http_handler: HttpHandler,
    api_base: Url,
    cache: Arc<CacheStore>,
}

impl ForgeClient {
    /// Create a client from configuration and a shared cache
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the base URL is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: &ClientConfig, cache: Arc<CacheStore>) -> TransferResult<Self> {
        let mut base = config.api_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_base = Url::parse(&base).map_err(|e| DownloadError::InvalidUrl {
            url: config.api_base_url.clone(),
            error: e.to_string(),
        })?;

        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(
            client,
            config.rate_limit_rps,
            config.max_api_retries,
            config.api_retry_base_delay,
        )?;

        tracing::debug!(
            "Forge client for {} ({})",
            api_base,
            if config.token.is_some() {
                "authenticated"
            } else {
                "anonymous"
            }
        );

        Ok(Self {
            http_handler,
            api_base,
            cache,
        })
    }

    /// Underlying HTTP client, shared with the transfer core
    pub fn http_client(&self) -> &reqwest::Client {
        self.http_handler.client()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    fn repo_url(&self, repo: &str, tail: &str) -> TransferResult<Url> {
        let path = format!("repos/{}/{}", repo.trim_matches('/'), tail.trim_start_matches('/'));
        self.api_base
            .join(&path)
            .map_err(|e| DownloadError::InvalidUrl {
                url: format!("{}{}", self.api_base, path),
                error: e.to_string(),
            })
    }

    async fn store<T: serde::Serialize>(&self, kind: CacheKind, key: &str, value: &T) {
        if let Err(e) = self.cache.put_typed(kind, key, value).await {
            tracing::warn!("Could not cache {}:{}: {}", kind.as_str(), key, e);
        }
    }

    /// Most recent `limit` releases of `repo`, newest first as listed by the forge
    pub async fn releases(&self, repo: &str, limit: usize) -> TransferResult<Vec<Release>> {
        let key = format!("{}?limit={}", repo, limit);
        if let Some(cached) = self.cache.get_fresh::<Vec<Release>>(CacheKind::Releases, &key).await {
            tracing::debug!("Using cached release list for {} ({} releases)", repo, cached.len());
            return Ok(cached);
        }

        let per_page = limit.clamp(1, forge::MAX_PER_PAGE);
        let mut releases: Vec<Release> = Vec::new();
        let mut page = 1;

        while releases.len() < limit {
            let mut url = self.repo_url(repo, "releases")?;
            url.query_pairs_mut()
                .append_pair("per_page", &per_page.to_string())
                .append_pair("page", &page.to_string());

            let batch: Vec<Release> = self.http_handler.get_json(&url).await?;
            let batch_len = batch.len();
            releases.extend(batch);

            if batch_len < per_page {
                break;
            }
            page += 1;
        }

        releases.truncate(limit);
        tracing::info!("Fetched {} release(s) for {}", releases.len(), repo);
        self.store(CacheKind::Releases, &key, &releases).await;
        Ok(releases)
    }

    /// Directory listing of `path` in `repo`
    pub async fn contents(&self, repo: &str, path: &str) -> TransferResult<Vec<ContentEntry>> {
        let key = format!("{}/{}", repo, path.trim_matches('/'));
        if let Some(cached) = self
            .cache
            .get_fresh::<Vec<ContentEntry>>(CacheKind::Contents, &key)
            .await
        {
            return Ok(cached);
        }

        let url = self.repo_url(repo, &format!("contents/{}", path.trim_matches('/')))?;
        let entries: Vec<ContentEntry> = self.http_handler.get_json(&url).await?;
        tracing::debug!("Listed {} entries in {}", entries.len(), key);
        self.store(CacheKind::Contents, &key, &entries).await;
        Ok(entries)
    }

    /// Most recent `count` commits of `repo`
    pub async fn commits(&self, repo: &str, count: usize) -> TransferResult<Vec<Commit>> {
        let per_page = count.clamp(1, forge::MAX_PER_PAGE);
        let key = format!("{}?per_page={}", repo, per_page);
        if let Some(cached) = self.cache.get_fresh::<Vec<Commit>>(CacheKind::Commits, &key).await {
            return Ok(cached);
        }

        let mut url = self.repo_url(repo, "commits")?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string());

        let api_commits: Vec<ApiCommit> = self.http_handler.get_json(&url).await?;
        let commits: Vec<Commit> = api_commits.into_iter().map(Commit::from).collect();
        tracing::debug!("Fetched {} commit(s) for {}", commits.len(), repo);
        self.store(CacheKind::Commits, &key, &commits).await;
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::CacheConfig;
    use mockito::{Matcher, Server};
    use std::time::Duration;
    use tempfile::TempDir;

    fn client_for(server: &Server, temp_dir: &TempDir) -> ForgeClient {
        let cache = Arc::new(CacheStore::new(temp_dir.path(), CacheConfig::default()));
        let config = ClientConfig::default()
            .with_api_base_url(server.url())
            .with_api_retries(0, Duration::from_millis(1));
        ForgeClient::new(&config, cache).unwrap()
    }

    /// Purpose: a second call inside the TTL is served from the cache
    /// Benefit: repeated runs make zero network calls for unchanged data
    #[tokio::test]
    async fn test_releases_cached_between_calls() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let mock = server
            .mock("GET", "/repos/meshtastic/firmware/releases")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "10".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"tag_name": "v2.0.0", "assets": []}, {"tag_name": "v1.0.0", "assets": []}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, &temp_dir);
        let first = client.releases("meshtastic/firmware", 10).await.unwrap();
        let second = client.releases("meshtastic/firmware", 10).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_releases_paginate_until_short_page() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();

        let page = |tags: Vec<String>| {
            let items: Vec<String> = tags
                .iter()
                .map(|t| format!(r#"{{"tag_name": "{}"}}"#, t))
                .collect();
            format!("[{}]", items.join(","))
        };
        let full_page: Vec<String> = (0..100).rev().map(|i| format!("v3.0.{}", i)).collect();
        let short_page: Vec<String> = vec!["v2.0.1".to_string(), "v2.0.0".to_string()];

        let page1 = server
            .mock("GET", "/repos/o/r/releases")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_body(page(full_page))
            .expect(1)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/repos/o/r/releases")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(page(short_page))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, &temp_dir);
        let releases = client.releases("o/r", 150).await.unwrap();

        assert_eq!(releases.len(), 102);
        assert_eq!(releases[0].tag_name, "v3.0.99");
        assert_eq!(releases[101].tag_name, "v2.0.0");
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_contents_and_commits() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let _contents = server
            .mock("GET", "/repos/meshtastic/meshtastic.github.io/contents/")
            .with_body(r#"[{"name": "firmware-2.7.14.e959000", "path": "firmware-2.7.14.e959000", "type": "dir"}]"#)
            .create_async()
            .await;
        let _commits = server
            .mock("GET", "/repos/meshtastic/meshtastic.github.io/commits")
            .match_query(Matcher::UrlEncoded("per_page".into(), "5".into()))
            .with_body(r#"[{"sha": "s1", "commit": {"message": "2.7.14.e959000 meshtastic/firmware@e959000", "committer": {"date": "2025-10-02T08:30:00Z"}}}]"#)
            .create_async()
            .await;

        let client = client_for(&server, &temp_dir);
        let entries = client
            .contents("meshtastic/meshtastic.github.io", "")
            .await
            .unwrap();
        assert!(entries[0].is_dir());

        let commits = client
            .commits("meshtastic/meshtastic.github.io", 5)
            .await
            .unwrap();
        assert_eq!(commits[0].sha, "s1");
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::new(temp_dir.path(), CacheConfig::default()));
        let config = ClientConfig::default().with_api_base_url("not a url");
        assert!(matches!(
            ForgeClient::new(&config, cache),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }
}
