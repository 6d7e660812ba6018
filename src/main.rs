//! NSFW Model Manager - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nsfw_model_manager::{ModelPathResolver, ResolverConfig, models};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nsfw-model-manager")]
#[command(about = "Resolve, download and cache the NSFW SavedModel", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Re-download even when the cache is current
    #[arg(long)]
    force_update: bool,

    /// Never contact the release feed
    #[arg(long)]
    skip_remote: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the model, downloading it if needed, and print its path
    Resolve,
    /// Print the newest cached model path without network access
    Cached,
    /// List cache entries as JSON
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the resolved path
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }

    let mut config = ResolverConfig::load(cli.config)?;

    // CLI overrides
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    if cli.force_update {
        config.force_update = true;
    }
    if cli.skip_remote {
        config.skip_remote = true;
    }

    config.validate()?;

    tracing::debug!(
        cache_dir = ?config.cache_dir,
        skip_remote = config.skip_remote,
        force_update = config.force_update,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Resolve) {
        Command::Resolve => {
            let resolver = ModelPathResolver::new(config).context("Failed to build resolver")?;
            let path = resolver.resolve().await.context("Failed to resolve model")?;
            println!("{}", path);
        }
        Command::Cached => {
            let resolver = ModelPathResolver::new(config).context("Failed to build resolver")?;
            let path = resolver
                .local_model_path()
                .await
                .context("No usable cached model")?;
            println!("{}", path);
        }
        Command::List => {
            let entries = match models::list_entries(&config.cache_dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_cache_miss() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}
