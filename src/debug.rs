//! Debug logging for magicmail
//!
//! Writes `tracing` output to ~/.config/magicmail/debug.log when enabled.
//! The shell owns stdout, so logs go to a file instead of stderr.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config;

const LOG_FILE: &str = "debug.log";
const DEFAULT_FILTER: &str = "magicmail=debug";

/// Returns the path of the debug log
pub fn log_path() -> Result<PathBuf> {
    config::config_dir().map(|dir| dir.join(LOG_FILE))
}

/// Installs the global subscriber. Does nothing unless `enabled`.
/// `RUST_LOG` overrides the default filter.
pub fn init(enabled: bool) -> Result<()> {
    if !enabled {
        return Ok(());
    }
    config::ensure_config_dir()?;
    init_at(&log_path()?)
}

fn init_at(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open debug log at {:?}", path))?;

    // Separator for this session
    writeln!(
        file,
        "\n========== Session started at {} ==========",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
