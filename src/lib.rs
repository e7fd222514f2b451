//! Strixforge: post-install configurator for AMD Strix Halo machines.
//!
//! The crate is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Stage results, run summaries and other shared data types
//! - **hardware**: Host metadata readers (kernel release, memory, CPU, DMI)
//! - **bootloader**: GRUB, systemd-boot, Limine and rEFInd backends plus detection
//! - **platform**: Device registry, quirks and the Strix Halo stages
//! - **orchestrator**: Stage contract, run state and the engine
//! - **system**: Command execution, host path resolution, package and service wrappers
//! - **config**: Persisted installer settings
//! - **ui**: The UI sink contract and its terminal, unattended, browser and native front ends
//! - **log_collector**: Persisted transcript behind the `log` facade

// Core foundational modules
pub mod error;
pub mod models;

pub mod hardware;
pub mod bootloader;
pub mod platform;
pub mod orchestrator;
pub mod system;
pub mod config;
pub mod ui;

pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    AppError, BootloaderError, ConfigError, DeviceError, HardwareError, InstallError, Result,
};

pub use models::{LogLevel, RunSummary, StageInfo, StageResult, StageStatus};

pub use bootloader::Bootloader;
pub use config::{InstallerSettings, SettingsManager};
pub use hardware::HostProfile;
pub use orchestrator::{Engine, RunPhase, RunState, Stage, StageContext};
pub use platform::{strix_halo_stages, Device, Quirk, QuirkKind};
pub use system::{CancelSignal, CommandRunner, Host};
pub use ui::{SharedSink, UiSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
