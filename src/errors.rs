//! Error types for Release Fetcher
//!
//! This module defines the error types for every component of the application.
//! Per-asset failures are converted into [`ErrorKind`] values on download results so
//! the orchestrator can decide what to retry; only configuration errors and
//! cancellation stop a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network, HTTP and transfer errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error from the underlying client
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic network failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server answered with a 4xx status
    #[error("HTTP {status} for {url}")]
    HttpClient { status: u16, url: String },

    /// Server answered with a 5xx status
    #[error("Server error: HTTP {status} for {url}")]
    HttpServer { status: u16, url: String },

    /// Rate limit exceeded (HTTP 429 or exhausted API quota)
    #[error("Rate limit exceeded for {url}")]
    RateLimited { url: String },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Incomplete download
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Downloaded content does not match the published digest
    #[error("SHA-256 mismatch for {path}. Expected: {expected}, got: {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Header value (e.g. API token) contains characters HTTP does not allow
    #[error("Invalid value for HTTP header {name}")]
    InvalidHeader { name: String },

    /// Digest string is not a valid SHA-256 hex value
    #[error("Invalid SHA-256 digest: {value}")]
    InvalidDigest { value: String },

    /// Response body could not be decoded
    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// The run was cancelled before or during the transfer
    #[error("Transfer cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Classify the error for result reporting and retry decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            DownloadError::Http(e) if e.is_connect() => ErrorKind::ConnectionError,
            DownloadError::Http(e) => match e.status() {
                Some(status) if status.as_u16() == 429 => ErrorKind::RateLimit,
                Some(status) if status.is_client_error() => ErrorKind::HttpClientError,
                Some(_) => ErrorKind::HttpError,
                None => ErrorKind::NetworkError,
            },
            DownloadError::Io(e) => io_error_kind(e),
            DownloadError::Network { .. } => ErrorKind::NetworkError,
            DownloadError::Timeout { .. } => ErrorKind::Timeout,
            DownloadError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            DownloadError::HttpClient { status, .. } => match status {
                401 | 403 => ErrorKind::AuthenticationError,
                _ => ErrorKind::HttpClientError,
            },
            DownloadError::HttpServer { .. } => ErrorKind::HttpError,
            DownloadError::RateLimited { .. } => ErrorKind::RateLimit,
            DownloadError::AtomicOperationFailed { .. } => ErrorKind::TemporaryFailure,
            DownloadError::IncompleteDownload { .. } => ErrorKind::NetworkError,
            DownloadError::HashMismatch { .. } => ErrorKind::CorruptedFile,
            DownloadError::InvalidHeader { .. } => ErrorKind::ValidationError,
            DownloadError::InvalidDigest { .. } => ErrorKind::ValidationError,
            DownloadError::InvalidResponse { .. } => ErrorKind::ValidationError,
            DownloadError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Archive and pattern errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Archive could not be opened or an entry failed its checksum
    #[error("Corrupt archive {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Entry would be written outside the destination directory
    #[error("Rejected archive entry escaping destination: {entry}")]
    PathTraversal { entry: String },

    /// Extraction pattern failed validation
    #[error("Invalid extraction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// I/O error while reading or writing entries
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Writing a cache document failed
    #[error("Failed to persist cache document {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Payload could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Local state file errors (history, tracking)
#[derive(Error, Debug)]
pub enum StateError {
    /// Writing a state file failed
    #[error("Failed to persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// State file content could not be parsed
    #[error("Corrupt state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    /// Configuration file could not be read or written
    #[error("Configuration file I/O error for {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// Failure classification carried by download results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    ConnectionError,
    Timeout,
    HttpError,
    RateLimit,
    TemporaryFailure,
    HttpClientError,
    PermissionError,
    ValidationError,
    CorruptedFile,
    DiskFull,
    InvalidUrl,
    AuthenticationError,
    PathTraversal,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Whether results with this kind are retried by the orchestrator
    ///
    /// Unknown failures are retried; cancellation never is.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::NetworkError
            | ErrorKind::ConnectionError
            | ErrorKind::Timeout
            | ErrorKind::HttpError
            | ErrorKind::RateLimit
            | ErrorKind::TemporaryFailure
            | ErrorKind::Unknown => true,

            ErrorKind::HttpClientError
            | ErrorKind::PermissionError
            | ErrorKind::ValidationError
            | ErrorKind::CorruptedFile
            | ErrorKind::DiskFull
            | ErrorKind::InvalidUrl
            | ErrorKind::AuthenticationError
            | ErrorKind::PathTraversal
            | ErrorKind::Cancelled => false,
        }
    }

    /// Stable snake_case name used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::HttpError => "http_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::TemporaryFailure => "temporary_failure",
            ErrorKind::HttpClientError => "http_client_error",
            ErrorKind::PermissionError => "permission_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::CorruptedFile => "corrupted_file",
            ErrorKind::DiskFull => "disk_full",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::PathTraversal => "path_traversal",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveError {
    /// Classify the error for result reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Corrupt { .. } => ErrorKind::CorruptedFile,
            ArchiveError::PathTraversal { .. } => ErrorKind::PathTraversal,
            ArchiveError::InvalidPattern { .. } => ErrorKind::ValidationError,
            ArchiveError::Io(e) => io_error_kind(e),
        }
    }
}

fn io_error_kind(error: &std::io::Error) -> ErrorKind {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionError,
        std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionError,
        // ENOSPC
        _ if error.raw_os_error() == Some(28) => ErrorKind::DiskFull,
        _ => ErrorKind::TemporaryFailure,
    }
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Archive error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// State file error
    #[error(transparent)]
    State(#[from] StateError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_retryable(),
            AppError::Archive(ArchiveError::Corrupt { .. }) => true,
            AppError::Cache(_) | AppError::State(_) => true,
            AppError::Archive(_) | AppError::Config(_) => false,
            AppError::Io(_) | AppError::Generic { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Archive(_) => "archive",
            AppError::Cache(_) => "cache",
            AppError::State(_) => "state",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transfer and API result type alias
pub type TransferResult<T> = std::result::Result<T, DownloadError>;

/// Archive result type alias
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// State file result type alias
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let not_found = DownloadError::HttpClient {
            status: 404,
            url: "https://example.com/a.zip".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::HttpClientError);
        assert!(!not_found.is_retryable());

        let forbidden = DownloadError::HttpClient {
            status: 403,
            url: "https://example.com/a.zip".to_string(),
        };
        assert_eq!(forbidden.kind(), ErrorKind::AuthenticationError);

        let server = DownloadError::HttpServer {
            status: 502,
            url: "https://example.com/a.zip".to_string(),
        };
        assert!(server.is_retryable());

        let limited = DownloadError::RateLimited {
            url: "https://example.com".to_string(),
        };
        assert_eq!(limited.kind(), ErrorKind::RateLimit);
        assert!(limited.is_retryable());
    }

    #[test]
    fn test_error_kind_retry_table() {
        let retryable = [
            ErrorKind::NetworkError,
            ErrorKind::ConnectionError,
            ErrorKind::Timeout,
            ErrorKind::HttpError,
            ErrorKind::RateLimit,
            ErrorKind::TemporaryFailure,
            ErrorKind::Unknown,
        ];
        let terminal = [
            ErrorKind::HttpClientError,
            ErrorKind::PermissionError,
            ErrorKind::ValidationError,
            ErrorKind::CorruptedFile,
            ErrorKind::DiskFull,
            ErrorKind::InvalidUrl,
            ErrorKind::AuthenticationError,
            ErrorKind::PathTraversal,
            ErrorKind::Cancelled,
        ];

        for kind in retryable {
            assert!(kind.is_retryable(), "{kind} should be retryable");
        }
        for kind in terminal {
            assert!(!kind.is_retryable(), "{kind} should not be retryable");
        }
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::HttpClientError).unwrap();
        assert_eq!(json, "\"http_client_error\"");
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    }

    #[test]
    fn test_app_error_category() {
        let config_error = AppError::Config(ConfigError::MissingField {
            field: "download_dir".to_string(),
        });
        assert_eq!(config_error.category(), "config");
        assert!(!config_error.is_recoverable());

        let archive_error = AppError::Archive(ArchiveError::PathTraversal {
            entry: "../x".to_string(),
        });
        assert_eq!(archive_error.category(), "archive");
        assert_eq!(
            ArchiveError::PathTraversal {
                entry: "../x".to_string()
            }
            .kind(),
            ErrorKind::PathTraversal
        );
    }

    #[test]
    fn test_io_permission_kind() {
        let error = DownloadError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(error.kind(), ErrorKind::PermissionError);
        assert!(!error.is_retryable());
    }
}
