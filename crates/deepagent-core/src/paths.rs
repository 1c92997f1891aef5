//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

/// Directory name under the home directory
pub const CONFIG_DIR_NAME: &str = ".deepagent";

/// Get the deepagent config directory (~/.deepagent)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the default config file (~/.deepagent/config.toml)
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the logs directory (~/.deepagent/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure the logs directory exists, creating it if necessary
pub fn ensure_logs_dir() -> std::io::Result<PathBuf> {
    let dir = logs_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
