//! Installer settings.
//!
//! `InstallerSettings` is persisted as JSON at `~/.config/strixforge/settings.json`.
//! A missing or unreadable file never stops the installer; defaults are used
//! and the problem is logged. Command-line flags override the loaded values
//! for a single invocation.

pub mod loader;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use loader::{default_log_dir, get_global_settings_path};

/// GID of the `video`/`render` group inside the container images we target.
pub const DEFAULT_CONTAINER_GPU_GID: u32 = 110;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Transcript directory. Empty means the platform default.
    pub log_dir: String,

    /// "pkexec" or "sudo". Ignored when already running as root.
    pub privilege_command: String,

    /// Account added to the lxd group. Empty means $SUDO_USER, then $USER.
    pub target_user: String,

    pub container_gpu_gid: u32,

    /// Roll back completed stages when a required stage aborts the run.
    pub rollback_on_failure: bool,

    /// Stage ids never run.
    pub skip_stages: Vec<String>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        InstallerSettings {
            log_dir: String::new(),
            privilege_command: "pkexec".to_string(),
            target_user: String::new(),
            container_gpu_gid: DEFAULT_CONTAINER_GPU_GID,
            rollback_on_failure: false,
            skip_stages: Vec::new(),
        }
    }
}

impl InstallerSettings {
    pub fn resolved_log_dir(&self) -> PathBuf {
        if self.log_dir.trim().is_empty() {
            default_log_dir()
        } else {
            PathBuf::from(&self.log_dir)
        }
    }
}

/// Settings persistence with graceful fallback to defaults.
pub struct SettingsManager;

impl SettingsManager {
    /// Load settings from the global path, or defaults if absent or malformed.
    ///
    /// The second value explains a fallback; callers log it once the
    /// transcript is up. A missing file is not worth a warning.
    pub fn load() -> (InstallerSettings, Option<String>) {
        let path = match get_global_settings_path() {
            Ok(p) => p,
            Err(e) => return (InstallerSettings::default(), Some(format!("{}; using defaults", e))),
        };
        match loader::load_settings_from_file(&path) {
            Ok(settings) => (settings, None),
            Err(ConfigError::FileNotFound(_)) => (InstallerSettings::default(), None),
            Err(e) => (
                InstallerSettings::default(),
                Some(format!(
                    "Failed to load {}, falling back to defaults: {}",
                    path.display(),
                    e
                )),
            ),
        }
    }

    /// Persist `settings` to the global path, returning where they were written.
    pub fn save(settings: &InstallerSettings) -> Result<PathBuf, ConfigError> {
        loader::validate_settings(settings)?;
        let path = get_global_settings_path()?;
        loader::save_settings_to_file(settings, &path)?;
        Ok(path)
    }
}
