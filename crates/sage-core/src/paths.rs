//! Filesystem locations used by Sage

use std::path::PathBuf;

use crate::constants;

/// Root configuration directory (`~/.sage`)
///
/// Falls back to the current directory when no home directory is known.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::paths::CONFIG_DIR_NAME)
}

/// Default config file path (`~/.sage/config.toml`)
pub fn config_file() -> PathBuf {
    config_dir().join(constants::paths::CONFIG_FILE_NAME)
}

/// Log directory (`~/.sage/logs`)
pub fn logs_dir() -> PathBuf {
    config_dir().join(constants::paths::LOGS_DIR_NAME)
}
