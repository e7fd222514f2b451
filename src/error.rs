//! Unified error type hierarchy for Strixforge
//!
//! Provides structured error handling with HardwareError, BootloaderError,
//! DeviceError, ConfigError, InstallError, and AppError.

use std::io;
use thiserror::Error;

/// Host metadata read errors (kernel release, memory, DMI identification).
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Kernel release unavailable: {0}")]
    KernelReleaseUnavailable(String),

    #[error("Memory information unavailable: {0}")]
    MemoryInfoUnavailable(String),
}

/// Bootloader configuration surface errors.
#[derive(Error, Debug)]
pub enum BootloaderError {
    #[error("Failed to read {bootloader} config {path}: {reason}")]
    ReadFailed {
        bootloader: String,
        path: String,
        reason: String,
    },

    #[error("Could not find {key} in {bootloader} config")]
    DirectiveMissing { bootloader: String, key: String },

    #[error("Failed to backup {bootloader} config: {reason}")]
    BackupFailed { bootloader: String, reason: String },

    #[error("Failed to write {bootloader} config: {reason}")]
    WriteFailed { bootloader: String, reason: String },

    #[error("Failed to update {bootloader}: {reason}")]
    RegenerateFailed { bootloader: String, reason: String },
}

/// Device detection and quirk errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Unrecognized device: manufacturer '{manufacturer}', product '{product}'")]
    Unrecognized {
        manufacturer: String,
        product: String,
    },

    #[error("Quirk '{id}' failed: {reason}")]
    QuirkFailed { id: String, reason: String },
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Errors returned from a stage's run or rollback operation.
///
/// The engine decides whether an error is pipeline-fatal; the error itself
/// carries no severity.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("kernel {required}+ required, found {found}. Please update your kernel")]
    KernelTooOld { found: String, required: String },

    #[error("Command '{cmd}' failed: {reason}")]
    Command { cmd: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Bootloader(#[from] BootloaderError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Engine state error: {0}")]
    State(String),
}

impl InstallError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallError::Cancelled)
    }
}

/// Global error type for front ends.
///
/// Provides unified error categorization and user-facing messages.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// OS command failed (e.g., pacman, uname, pkexec)
    #[error("Command '{cmd}' failed: {reason}")]
    OsCommand { cmd: String, reason: String },

    /// Hardware detection failed
    #[error("Hardware detection failed: {0}")]
    HardwareDetection(String),

    /// Installation pipeline failed
    #[error("Installation failed: {0}")]
    Install(String),

    /// File I/O error (read/write/delete)
    #[error("I/O error: {0}")]
    Io(String),

    /// Settings persist or deserialize error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Front end could not start (no display, port unavailable)
    #[error("Front end unavailable: {0}")]
    FrontEnd(String),
}

impl AppError {
    /// Get a user-facing error message suitable for UI display
    pub fn user_message(&self) -> String {
        match self {
            AppError::OsCommand { cmd, reason } => {
                format!("Failed to execute '{}': {}", cmd, reason)
            }
            AppError::HardwareDetection(msg) => format!("Could not detect hardware: {}", msg),
            AppError::Install(msg) => format!("Installation failed: {}", msg),
            AppError::Io(msg) => format!("File operation failed: {}", msg),
            AppError::Settings(msg) => format!("Settings error: {}", msg),
            AppError::FrontEnd(msg) => format!("Could not start interface: {}", msg),
        }
    }
}

impl From<InstallError> for AppError {
    fn from(e: InstallError) -> Self {
        match e {
            InstallError::Command { cmd, reason } => AppError::OsCommand { cmd, reason },
            InstallError::Hardware(h) => AppError::HardwareDetection(h.to_string()),
            other => AppError::Install(other.to_string()),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Settings(e.to_string())
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

/// Top-level result type for operations that may fail.
/// Use this as the return type for all fallible functions.
/// Example: `fn risky_operation() -> Result<String>`
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
