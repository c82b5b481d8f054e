//! Command-line interface components
//!
//! This module contains CLI-specific code for the Release Fetcher
//! application: argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    CacheAction, CacheArgs, Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs,
};
pub use commands::{handle_cache, handle_cleanup, handle_config, handle_download, handle_versions};
pub use progress::{ProgressConfig, Spinner};
