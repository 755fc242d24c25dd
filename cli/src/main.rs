//! Warden CLI - offline view of the isolation store.
//!
//! The bot process embeds [`warden_core::Warden`]; this binary only reads and
//! rewrites the persisted record, so it is safe to run while the bot is down.
//!
//! ```text
//! warden path        resolved store location
//! warden show        stored configuration, raw IDs
//! warden normalize   rewrite in the current layout (migrates legacy files)
//! ```
//!
//! `--store <path>` overrides the store location from the settings file.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use warden_config::{Settings, config_dir};
use warden_core::{ConfigView, store};
use warden_types::StoredLayout;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Inspect and maintain the isolation store")]
struct Cli {
    /// Store file to use instead of the configured one
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the resolved store location
    Path,
    /// Print the stored configuration with raw IDs
    Show,
    /// Rewrite the store in the current layout
    Normalize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let store_path = match cli.store {
        Some(path) => path,
        None => {
            Settings::load()
                .context("failed to load settings")?
                .store_path
        }
    };
    let path = store_path.as_path();

    match cli.command {
        Commands::Path => println!("{}", path.display()),
        Commands::Show => println!("{}", render(path)),
        Commands::Normalize => {
            let layout = normalize(path)?;
            println!("Rewrote {} (was {layout:?})", path.display());
        }
    }
    Ok(())
}

fn render(path: &Path) -> String {
    let config = store::load(path);
    ConfigView::unresolved(&config).to_notice().to_plain_text()
}

/// Rewrite the store in the current layout, returning the layout it had.
fn normalize(path: &Path) -> Result<StoredLayout> {
    let Some((config, layout)) = store::read(path)? else {
        bail!("no isolation store at {}", path.display());
    };
    if layout == StoredLayout::Unrecognized {
        bail!(
            "{} has an unrecognized layout; refusing to overwrite it",
            path.display()
        );
    }
    store::save(path, &config)?;
    tracing::info!(path = %path.display(), ?layout, "Isolation store normalized");
    Ok(layout)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Stdout carries command output; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.warden/logs/warden.log
    if let Some(dir) = config_dir() {
        candidates.push(dir.join("logs").join("warden.log"));
    }

    candidates.push(PathBuf::from(".warden").join("logs").join("warden.log"));

    candidates
}
