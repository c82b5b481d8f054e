//! Command-line argument parsing for Release Fetcher
//!
//! This module defines the CLI structure using clap derive macros: a
//! download run, local version reporting, cleanup, cache and config
//! management.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

/// Release Fetcher - Mirror firmware and app releases locally
#[derive(Parser, Debug)]
#[command(
    name = "release-fetcher",
    version,
    about = "Mirror firmware and app release assets into a local directory",
    long_about = "Keeps a local mirror of the newest firmware and app releases of a code forge project.
Tracks revoked releases, follows prerelease builds, extracts selected archive entries and prunes old versions."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download directory, overriding the configured one
    #[arg(long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download new releases and prune old ones
    Download(DownloadArgs),

    /// Show the latest locally recorded versions
    Versions,

    /// Remove version directories outside the keep window
    Cleanup,

    /// Manage the metadata cache
    Cache(CacheArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Skip firmware releases
    #[arg(long)]
    pub no_firmware: bool,

    /// Skip app releases
    #[arg(long)]
    pub no_app: bool,

    /// Also mirror the newest prerelease firmware build
    #[arg(long)]
    pub prerelease: bool,

    /// Versions kept on disk per family
    #[arg(short, long, value_name = "N")]
    pub keep: Option<usize>,

    /// Abort unless the network probe host is reachable
    #[arg(long)]
    pub require_network: bool,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached API response
    Clear,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,

        /// Target path (defaults to the user config directory)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    /// Log level directive, falling back to the configured level
    ///
    /// Verbosity flags win over the `[logging]` section.
    pub fn log_directive(&self, configured: &str) -> String {
        let flagged = self.global.quiet || self.global.very_verbose || self.global.verbose;
        if flagged || configured.trim().is_empty() {
            self.log_level().to_string().to_lowercase()
        } else {
            configured.trim().to_lowercase()
        }
    }
}

impl DownloadArgs {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.no_firmware && self.no_app {
            return Err("Cannot specify both --no-firmware and --no-app".to_string());
        }
        if self.no_firmware && self.prerelease {
            return Err("--prerelease needs the firmware family enabled".to_string());
        }
        if self.keep == Some(0) {
            return Err("--keep must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Fold the flags into a loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if self.no_firmware {
            config.firmware.enabled = false;
        }
        if self.no_app {
            config.app.enabled = false;
        }
        if self.prerelease {
            config.prerelease.enabled = true;
        }
        if let Some(keep) = self.keep {
            config.firmware.keep_count = keep;
            config.app.keep_count = keep;
        }
        if self.require_network {
            config.preflight.require_network = true;
        }
    }
}
