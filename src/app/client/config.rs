//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP client
//! used for forge API calls and asset downloads.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{forge, http, limits};
use crate::errors::{DownloadError, TransferResult};

/// Configuration for the forge HTTP client
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Forge API base URL
    pub api_base_url: String,
    /// Optional API token sent as a bearer credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Rate limit for API requests (requests per second)
    pub rate_limit_rps: u32,
    /// Retries for failed API requests
    pub max_api_retries: u32,
    /// Base delay for API exponential backoff
    #[serde(with = "humantime_serde")]
    pub api_retry_base_delay: Duration,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
}

// Keeps the token out of logs
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("max_api_retries", &self.max_api_retries)
            .field("api_retry_base_delay", &self.api_retry_base_delay)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("pool_max_per_host", &self.pool_max_per_host)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: forge::DEFAULT_API_BASE.to_string(),
            token: None,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_api_retries: limits::MAX_API_RETRIES,
            api_retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            tcp_nodelay: true,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
        }
    }
}

impl ClientConfig {
    /// Point the client at a different API host
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Set API retry count and base backoff delay
    pub fn with_api_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_api_retries = max_retries;
        self.api_retry_base_delay = base_delay;
        self
    }

    fn default_headers(&self) -> TransferResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(http::API_ACCEPT));

        if let Some(token) = &self.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| DownloadError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> TransferResult<Client> {
        Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .default_headers(self.default_headers()?)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_idle_timeout(http::POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(self.pool_max_per_host)
            .build()
            .map_err(DownloadError::Http)
    }
}
