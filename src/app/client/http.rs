//! Core HTTP operations with rate limiting and retry logic
//!
//! API requests pass through a governor rate limiter and are retried with
//! exponential backoff on transport errors, 429 and 503. Other 4xx responses
//! are returned immediately as [`DownloadError::HttpClient`].

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::errors::{DownloadError, TransferResult};

/// Map a non-success status to the matching error
pub fn status_error(status: StatusCode, url: &Url, response: &Response) -> DownloadError {
    let url = url.to_string();
    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && quota_exhausted)
    {
        DownloadError::RateLimited { url }
    } else if status.is_client_error() {
        DownloadError::HttpClient {
            status: status.as_u16(),
            url,
        }
    } else {
        DownloadError::HttpServer {
            status: status.as_u16(),
            url,
        }
    }
}

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the rate is zero
    pub fn new(
        client: Client,
        rate_limit_rps: u32,
        max_retries: u32,
        base_delay: Duration,
    ) -> TransferResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries,
            base_delay,
        })
    }

    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> TransferResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| DownloadError::Network {
            message: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    fn backoff(&self, retries: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(retries))
    }

    /// Fetches a successful response with rate limiting and retry logic
    ///
    /// # Errors
    ///
    /// Returns the classified `DownloadError` once retries are exhausted, or
    /// immediately for non-retryable statuses
    pub async fn get_response(&self, url: &Url) -> TransferResult<Response> {
        let mut retries = 0;
        loop {
            // Jittered wait after a burst
            self.rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
                .await;

            let error = match self.client.get(url.as_str()).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Fetched {}", url);
                    return Ok(response);
                }
                Ok(response) => status_error(response.status(), url, &response),
                Err(e) => DownloadError::Http(e),
            };

            let retry_worthy = matches!(
                error,
                DownloadError::RateLimited { .. }
                    | DownloadError::HttpServer { status: 503, .. }
                    | DownloadError::HttpServer { status: 502, .. }
                    | DownloadError::Http(_)
            );

            if !retry_worthy || retries >= self.max_retries {
                tracing::debug!("Request to {} failed: {}", url, error);
                return Err(error);
            }

            retries += 1;
            let delay = self.backoff(retries);
            tracing::warn!(
                "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                retries,
                self.max_retries,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> TransferResult<T> {
        let response = self.get_response(url).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| DownloadError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::config::ClientConfig;
    use mockito::Server;

    fn handler(max_retries: u32) -> HttpHandler {
        let client = ClientConfig::default().build_http_client().unwrap();
        HttpHandler::new(client, 50, max_retries, Duration::from_millis(1)).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let rate_limiter = HttpHandler::build_rate_limiter(5).unwrap();
        rate_limiter.until_ready().await;
    }

    #[test]
    fn test_rate_limiter_zero_fails() {
        assert!(HttpHandler::build_rate_limiter(0).is_err());
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let client = ClientConfig::default().build_http_client().unwrap();
        let handler = HttpHandler::new(client, 5, 3, Duration::from_millis(500)).unwrap();

        assert_eq!(handler.backoff(1), Duration::from_millis(1000));
        assert_eq!(handler.backoff(2), Duration::from_millis(2000));
        assert_eq!(handler.backoff(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/missing", server.url())).unwrap();
        let result = handler(3).get_response(&url).await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpClient { status: 404, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_overload_retried_then_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/busy", server.url())).unwrap();
        let result = handler(2).get_response(&url).await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpServer { status: 503, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exhausted_quota_maps_to_rate_limit() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/limited")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/limited", server.url())).unwrap();
        let result = handler(0).get_response(&url).await;

        assert!(matches!(result, Err(DownloadError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": 42}"#)
            .create_async()
            .await;

        #[derive(serde::Deserialize)]
        struct Body {
            value: u32,
        }

        let url = Url::parse(&format!("{}/data", server.url())).unwrap();
        let body: Body = handler(0).get_json(&url).await.unwrap();
        assert_eq!(body.value, 42);
    }
}
