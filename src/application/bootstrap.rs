use crate::infrastructure::config::{ensure_default_config, load_config_with_env, EngineConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_logging;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config: EngineConfig,
}

impl BootstrapResult {
    /// Installs the JSON log writer under `logs_dir` at the configured level.
    /// Logging is process-wide, so the host application calls this once.
    pub fn init_logging(&self) -> Result<(), InfraError> {
        init_logging(&self.config.log_level, &self.logs_dir)
    }
}

/// Prepares `<root>/config` and `<root>/logs`, writes the default
/// `engine.json` on first run and loads it with environment overrides.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_config_with_env(&config_dir)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        config,
    })
}
