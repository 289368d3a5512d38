// src/lib.rs
pub mod application;
pub mod cli;
pub mod constants;
pub mod domain;
pub mod infrastructure;
pub mod util;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::application::SyncOrchestrator;
use crate::cli::args::{Args, Command};
use crate::infrastructure::{Config, SqliteStore};

pub fn run(args: Args) -> Result<()> {
    debug!(?args, "Starting notebridge with arguments");

    let config_path = match &args.config {
        Some(path) => {
            debug!(?path, "Using provided config path");
            path.clone()
        }
        None => find_config_path()?,
    };

    match args.command {
        Command::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file {} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create config folder {}", parent.display())
                    })?;
                }
            }
            Config::create_default(&config_path)?;
            info!(path = %config_path.display(), "Wrote default config");
            println!("Wrote default config to {}", config_path.display());
            Ok(())
        }
        Command::Sync => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config {}", config_path.display()))?;
            let mut store = SqliteStore::open(config.store_path())?;
            let mut orchestrator = SyncOrchestrator::new(&mut store, config)?;

            info!("Starting sync pass");
            let report = orchestrator.run_pass()?;
            println!("{}", report.summary());
            Ok(())
        }
        Command::Status => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config {}", config_path.display()))?;
            let mut store = SqliteStore::open(config.store_path())?;
            let mut orchestrator = SyncOrchestrator::new(&mut store, config)?;

            let status = orchestrator.status()?;
            println!("{}", status.summary());
            Ok(())
        }
    }
}

/// Default config location: `notebridge.toml` in the working directory,
/// falling back to the user's config directory.
pub fn find_config_path() -> Result<PathBuf> {
    let local = PathBuf::from("notebridge.toml");
    if local.exists() {
        return Ok(local);
    }

    let config_dir = dirs::config_dir().context("Could not find user config directory")?;
    Ok(config_dir.join("notebridge").join("notebridge.toml"))
}
