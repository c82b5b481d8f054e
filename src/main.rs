//! Release Fetcher CLI application
//!
//! Command-line interface for mirroring firmware and app releases into a
//! local directory.

use std::process;

use tracing::{info, warn};
use tracing_subscriber::{filter::Directive, fmt, EnvFilter};

use release_fetcher::cli::{
    handle_cache, handle_cleanup, handle_config, handle_download, handle_versions, Cli, Commands,
};
use release_fetcher::config::AppConfig;
use release_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let mut config = AppConfig::load(cli.global.config.as_deref()).await?;
    if let Some(download_dir) = &cli.global.download_dir {
        config.download_dir = download_dir.clone();
    }

    init_logging(&cli, &config);
    info!("Release Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let quiet = cli.global.quiet;
    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, config, quiet).await
        }
        Commands::Versions => handle_versions(config).await,
        Commands::Cleanup => {
            info!("Executing cleanup command");
            handle_cleanup(config, quiet).await
        }
        Commands::Cache(args) => handle_cache(args, config).await,
        Commands::Config(args) => handle_config(args, config).await,
    }
}

/// Initialize logging from CLI verbosity, then the `[logging]` section
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli.log_directive(&config.logging.level);

    let mut filter = EnvFilter::from_default_env();
    let mut rejected = None;
    match format!("release_fetcher={}", level).parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => rejected = Some(e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if let Some(e) = rejected {
        warn!("Ignoring log level {:?}: {}", level, e);
    }
    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
