//! Release Fetcher Library
//!
//! Resolves, mirrors and prunes versioned release artifacts (firmware images
//! and application packages) published through a Git-forge release API.
//! Tracks the lifecycle of every release it has seen, including loose-file
//! prerelease builds, and keeps a local mirror within a retention window.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
