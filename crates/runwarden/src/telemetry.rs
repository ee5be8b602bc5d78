use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_NAME: &str = "runwarden.log";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Pick the filter: an explicit directive wins, then `RUST_LOG`, then `info`.
pub fn env_filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter '{directive}'")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Install the global subscriber: human-readable output on stderr plus an
/// appended plain-text copy in `<log_directory>/runwarden.log`.
///
/// Returns the log file path.
pub fn init(log_directory: &Path, directive: Option<&str>) -> Result<PathBuf> {
    std::fs::create_dir_all(log_directory).with_context(|| {
        format!(
            "failed to create log directory {}",
            log_directory.display()
        )
    })?;

    let path = log_directory.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(directive)?)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(path)
}
