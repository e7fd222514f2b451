//! Settings file location and (de)serialization.

use crate::config::InstallerSettings;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "strixforge";

/// Directory holding settings: ~/.config/strixforge
pub fn settings_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine config directory".to_string())
    })?;
    Ok(base.join(APP_DIR))
}

/// Get the global settings path: ~/.config/strixforge/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    Ok(settings_dir()?.join("settings.json"))
}

/// Default transcript directory: ~/.local/state/strixforge/logs, or ./logs without a home.
pub fn default_log_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join(APP_DIR).join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Load settings from a JSON file.
pub fn load_settings_from_file(path: &Path) -> Result<InstallerSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.display().to_string())
        } else {
            ConfigError::IoError(e)
        }
    })?;
    let settings: InstallerSettings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Save settings as pretty JSON, creating parent directories.
pub fn save_settings_to_file(settings: &InstallerSettings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn validate_settings(settings: &InstallerSettings) -> Result<(), ConfigError> {
    match settings.privilege_command.as_str() {
        "pkexec" | "sudo" => {}
        other => {
            return Err(ConfigError::ValidationFailed(format!(
                "privilege_command must be \"pkexec\" or \"sudo\", got \"{}\"",
                other
            )))
        }
    }
    if settings.target_user == "root" {
        return Err(ConfigError::ValidationFailed(
            "target_user cannot be root".to_string(),
        ));
    }
    if settings
        .target_user
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
    {
        return Err(ConfigError::ValidationFailed(format!(
            "target_user '{}' contains invalid characters",
            settings.target_user
        )));
    }
    Ok(())
}
