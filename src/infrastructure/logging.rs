//! Process-wide structured logging.
//!
//! Events are written as JSON lines to `<logs_dir>/engine.log`. The first
//! successful call wins; later calls with the same directory are no-ops and
//! calls with a different directory are rejected.

use crate::infrastructure::error::InfraError;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "engine.log";
const SUPPORTED_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn init_logging(level: &str, logs_dir: &Path) -> Result<(), InfraError> {
    let level = normalize_level(level)?;

    if let Some(active) = LOG_DIR.get() {
        return ensure_same_dir(active, logs_dir);
    }

    std::fs::create_dir_all(logs_dir)?;
    let filter = EnvFilter::try_new(format!("agenda_core={level}"))
        .map_err(|error| InfraError::Logging(format!("invalid log filter: {error}")))?;
    let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(appender)
        .with_target(false)
        .try_init()
        .map_err(|error| InfraError::Logging(format!("failed to install subscriber: {error}")))?;

    let active = LOG_DIR.get_or_init(|| logs_dir.to_path_buf());
    ensure_same_dir(active, logs_dir)?;
    tracing::info!(log_level = level, log_dir = %logs_dir.display(), "logging initialized");
    Ok(())
}

fn ensure_same_dir(active: &Path, requested: &Path) -> Result<(), InfraError> {
    if active == requested {
        return Ok(());
    }
    Err(InfraError::Logging(format!(
        "logging already initialized at `{}`; refusing to switch to `{}`",
        active.display(),
        requested.display()
    )))
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, InfraError> {
    let lowered = level.trim().to_ascii_lowercase();
    SUPPORTED_LEVELS
        .iter()
        .copied()
        .find(|candidate| *candidate == lowered)
        .ok_or_else(|| InfraError::Logging(format!("unsupported log level `{}`", level.trim())))
}
