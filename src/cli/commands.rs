//! Command handlers for Release Fetcher CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments and the orchestrator.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::cache::CacheStore;
use crate::app::orchestrator::{DownloadStatistics, FileType, Orchestrator, PipelineOutcome};
use crate::app::signals::{SignalHandler, Shutdown};
use crate::cli::{CacheAction, CacheArgs, ConfigAction, ConfigArgs, DownloadArgs};
use crate::cli::{ProgressConfig, Spinner};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the download command
///
/// Runs the full pipeline with Ctrl-C cancellation and prints a summary.
/// Returns an error when any file failed so scripted runs can react.
pub async fn handle_download(args: DownloadArgs, mut config: AppConfig, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    args.validate().map_err(AppError::generic)?;
    args.apply_to(&mut config);

    let shutdown = Shutdown::new();
    let signal_task = SignalHandler::new(shutdown.clone()).setup();

    let orchestrator = Orchestrator::with_shutdown(config, shutdown)?;
    info!(
        "Mirroring into {}",
        orchestrator.config().download_dir.display()
    );

    let spinner = Spinner::start(
        &ProgressConfig::for_terminal(quiet),
        "Checking releases...",
    );
    let outcome = orchestrator.run_download_pipeline().await;
    spinner.finish();
    signal_task.abort();
    let outcome = outcome?;

    let stats = orchestrator.get_download_statistics();
    if !quiet {
        print_summary(&outcome, &stats);
    }
    debug!("Download command completed in {:?}", start_time.elapsed());

    if outcome.aborted {
        return Err(AppError::generic("Pre-flight check failed, nothing downloaded"));
    }
    if !outcome.failures.is_empty() {
        return Err(AppError::generic(format!(
            "{} file(s) failed to download",
            outcome.failures.len()
        )));
    }
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome, stats: &DownloadStatistics) {
    if outcome.aborted {
        println!("⚠️  {}", stats.summary());
        return;
    }

    println!("📊 Download Summary:");
    println!("  Downloaded: {}", stats.successful_downloads);
    for file_type in FileType::ALL {
        let count = stats.count(file_type);
        if count > 0 {
            println!("    {}: {}", file_type.as_str(), count);
        }
    }
    println!("  Skipped: {}", stats.skipped_downloads);
    println!("  Failed: {}", stats.failed_downloads);
    println!("  Success rate: {:.1}%", stats.success_rate);
    println!("  Total time: {:?}", stats.duration);
    if stats.cancelled {
        println!("🛑 Run was cancelled before completion");
    }

    if !outcome.failures.is_empty() {
        println!("\nFailures:");
        for failure in &outcome.failures {
            println!(
                "  • {} {}: {}",
                failure.release_tag,
                failure.file_path.display(),
                failure.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// Handle the versions command
pub async fn handle_versions(config: AppConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config)?;
    let versions = orchestrator.get_latest_versions().await;

    if versions.is_empty() {
        println!("ℹ️  No versions recorded yet - run 'release-fetcher download' first");
        return Ok(());
    }

    println!("📦 Latest Versions");
    println!("==================");
    for (key, version) in &versions {
        println!("  {:<20} {}", key, version);
    }
    Ok(())
}

/// Handle the cleanup command
pub async fn handle_cleanup(config: AppConfig, quiet: bool) -> Result<()> {
    let orchestrator = Orchestrator::new(config)?;
    let spinner = Spinner::start(
        &ProgressConfig::for_terminal(quiet),
        "Removing old versions...",
    );
    let removed = orchestrator.cleanup_old_versions().await;
    spinner.finish();
    let removed = removed?;

    if quiet {
        return Ok(());
    }
    if removed.is_empty() {
        println!("✅ Nothing to clean up");
    } else {
        println!("🧹 Removed {} director(ies):", removed.len());
        for path in &removed {
            println!("  • {}", path.display());
        }
    }
    Ok(())
}

/// Handle cache management commands
pub async fn handle_cache(args: CacheArgs, config: AppConfig) -> Result<()> {
    match args.action {
        CacheAction::Clear => {
            let store = CacheStore::new(config.cache_root(), config.cache.clone());
            let removed = store.clear_all().await?;
            info!("Cleared {} cache file(s) under {}", removed, store.root().display());
            println!(
                "🗑️  Cleared {} cache file(s) in {}",
                removed,
                store.root().display()
            );
            Ok(())
        }
    }
}

/// Handle configuration commands
pub async fn handle_config(args: ConfigArgs, config: AppConfig) -> Result<()> {
    match args.action {
        ConfigAction::Init { force, path } => {
            let path = match path {
                Some(path) => path,
                None => AppConfig::default_config_path()?,
            };
            handle_config_init(path, force).await
        }
        ConfigAction::Show => {
            if let Err(e) = config.validate() {
                warn!("Effective configuration is invalid: {}", e);
                println!("# ⚠️  {}", e);
            }
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn handle_config_init(path: PathBuf, force: bool) -> Result<()> {
    if AppConfig::write_default_config(&path, force).await? {
        println!("✅ Wrote default configuration to {}", path.display());
    } else {
        println!(
            "ℹ️  {} already exists - use --force to overwrite",
            path.display()
        );
    }
    Ok(())
}
