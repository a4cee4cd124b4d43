use std::fs;
use std::path::{Path, PathBuf};

use crate::{AppError, APP_NAME};

/// Per-user data directory.
///
/// Windows: `%APPDATA%\sip-qa`, macOS: `~/Library/Application Support/sip-qa`,
/// elsewhere `~/.sip-qa`. Falls back to the temp directory.
pub fn app_data_dir() -> PathBuf {
    platform_data_dir().unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

#[cfg(target_os = "windows")]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(target_os = "macos")]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(format!(".{APP_NAME}")))
}

/// Creates `dir` (and parents) if needed.
pub fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|source| AppError::Io {
        path: dir.to_path_buf(),
        source,
    })
}
