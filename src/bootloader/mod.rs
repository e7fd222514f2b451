//! Bootloader configuration backends and the resolver that finds the active ones.
//!
//! Each family keeps its kernel command line in an incompatible syntax, so the
//! set is closed: one variant per family, each with its own detection check,
//! config path, text patch and regeneration command.

pub mod patch;

use crate::error::{BootloaderError, InstallError};
use crate::system::{CommandRequest, Host};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Supported bootloader families, in resolver detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bootloader {
    Grub,
    SystemdBoot,
    Limine,
    Refind,
}

impl Bootloader {
    pub const ALL: [Bootloader; 4] = [
        Bootloader::Grub,
        Bootloader::SystemdBoot,
        Bootloader::Limine,
        Bootloader::Refind,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Bootloader::Grub => "GRUB",
            Bootloader::SystemdBoot => "systemd-boot",
            Bootloader::Limine => "Limine",
            Bootloader::Refind => "rEFInd",
        }
    }

    /// Host path of the file carrying the kernel command line.
    pub fn config_path(&self) -> &'static str {
        match self {
            Bootloader::Grub => "/etc/default/grub",
            Bootloader::SystemdBoot => "/etc/sdboot-manage.conf",
            Bootloader::Limine => "/etc/default/limine",
            Bootloader::Refind => "/boot/refind_linux.conf",
        }
    }

    /// Re-checks the host every call. True only when every signal is present.
    pub fn is_installed(&self, host: &Host) -> bool {
        let config = host.exists(self.config_path());
        match self {
            Bootloader::Grub => config && host.exists("/boot/grub"),
            Bootloader::SystemdBoot => {
                host.has_command("sdboot-manage")
                    && config
                    && host.exists("/sys/firmware/efi")
                    && host.exists("/boot/loader/loader.conf")
            }
            Bootloader::Limine => {
                host.has_command("limine-mkinitcpio") && config && host.exists("/boot/limine")
            }
            Bootloader::Refind => config,
        }
    }

    /// Copy the config to `<path>.backup-<YYYYMMDD-HHMMSS>` and return the backup's host path.
    ///
    /// An existing backup is never overwritten; a second backup within the same
    /// second gets a numeric suffix.
    pub async fn backup(&self, host: &Host) -> Result<PathBuf, InstallError> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let base = format!("{}.backup-{}", self.config_path(), stamp);
        let mut backup = base.clone();
        let mut n = 1;
        while host.exists(&backup) {
            backup = format!("{}-{}", base, n);
            n += 1;
        }

        let request = CommandRequest::sudo(
            "cp",
            [
                host.path(self.config_path()).to_string_lossy().to_string(),
                host.path(&backup).to_string_lossy().to_string(),
            ],
        );
        host.exec(request).await.map_err(|e| match e {
            InstallError::Cancelled => InstallError::Cancelled,
            other => BootloaderError::BackupFailed {
                bootloader: self.name().to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;

        log::info!("[Bootloader] {} config backed up to {}", self.name(), backup);
        Ok(PathBuf::from(backup))
    }

    fn read_config(&self, host: &Host) -> Result<String, BootloaderError> {
        host.read_to_string(self.config_path())
            .map_err(|e| BootloaderError::ReadFailed {
                bootloader: self.name().to_string(),
                path: self.config_path().to_string(),
                reason: e.to_string(),
            })
    }

    /// The directive `add_param` edits, for error messages.
    fn cmdline_key(&self) -> &'static str {
        match self {
            Bootloader::Grub => patch::GRUB_CMDLINE_KEY,
            Bootloader::SystemdBoot => patch::SDBOOT_OPTIONS_KEY,
            Bootloader::Limine => patch::LIMINE_CMDLINE_KEY,
            Bootloader::Refind => patch::REFIND_OPTIONS_KEY,
        }
    }

    /// Whether the config text already carries `param`.
    pub fn has_param(&self, host: &Host, param: &str) -> Result<bool, BootloaderError> {
        let content = self.read_config(host)?;
        Ok(match self {
            Bootloader::Grub => patch::grub_cmdline(&content)
                .map(|v| v.contains(param))
                .unwrap_or(false),
            _ => content.contains(param),
        })
    }

    /// Add a kernel parameter and regenerate so it takes effect on next boot.
    ///
    /// A parameter that is already present is a successful no-op. A patch that
    /// would not change the file fails with `DirectiveMissing` before anything
    /// is written. A failed regeneration leaves the patched text in place.
    pub async fn add_param(&self, host: &Host, param: &str) -> Result<(), InstallError> {
        let content = self.read_config(host)?;
        let patched = match self {
            Bootloader::Grub => {
                let current = patch::grub_cmdline(&content).ok_or_else(|| {
                    BootloaderError::DirectiveMissing {
                        bootloader: self.name().to_string(),
                        key: patch::GRUB_CMDLINE_KEY.to_string(),
                    }
                })?;
                if current.contains(param) {
                    log::debug!("[Bootloader] {} already has {}", self.name(), param);
                    return Ok(());
                }
                patch::patch_grub(&content, param)?
            }
            _ if content.contains(param) => {
                log::debug!("[Bootloader] {} already has {}", self.name(), param);
                return Ok(());
            }
            Bootloader::SystemdBoot => patch::patch_sdboot(&content, param),
            Bootloader::Limine => patch::patch_limine(&content, param),
            Bootloader::Refind => patch::patch_refind(&content, param),
        };
        if patched == content || !patched.contains(param) {
            return Err(BootloaderError::DirectiveMissing {
                bootloader: self.name().to_string(),
                key: self.cmdline_key().to_string(),
            }
            .into());
        }

        host.install_file(self.config_path(), &patched)
            .await
            .map_err(|e| match e {
                InstallError::Cancelled => InstallError::Cancelled,
                other => BootloaderError::WriteFailed {
                    bootloader: self.name().to_string(),
                    reason: other.to_string(),
                }
                .into(),
            })?;
        log::info!("[Bootloader] Added {} to {}", param, self.config_path());

        self.regenerate(host).await
    }

    /// The command that compiles the config into what firmware actually boots, if any.
    pub fn regenerate_command(&self) -> Option<CommandRequest> {
        match self {
            Bootloader::Grub => Some(CommandRequest::sudo(
                "grub-mkconfig",
                ["-o", "/boot/grub/grub.cfg"],
            )),
            Bootloader::SystemdBoot => Some(CommandRequest::sudo("sdboot-manage", ["gen"])),
            Bootloader::Limine => Some(CommandRequest::sudo("limine-mkinitcpio", Vec::<String>::new())),
            // rEFInd reads refind_linux.conf directly at boot
            Bootloader::Refind => None,
        }
    }

    pub async fn regenerate(&self, host: &Host) -> Result<(), InstallError> {
        let request = match self.regenerate_command() {
            Some(r) => r,
            None => return Ok(()),
        };
        host.exec(request).await.map_err(|e| match e {
            InstallError::Cancelled => InstallError::Cancelled,
            other => BootloaderError::RegenerateFailed {
                bootloader: self.name().to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;
        Ok(())
    }

    /// Copy a backup made by [`Bootloader::backup`] back over the config and regenerate.
    pub async fn restore(&self, host: &Host, backup: &std::path::Path) -> Result<(), InstallError> {
        let request = CommandRequest::sudo(
            "cp",
            [
                host.path(backup).to_string_lossy().to_string(),
                host.path(self.config_path()).to_string_lossy().to_string(),
            ],
        );
        host.exec(request).await?;
        log::info!("[Bootloader] Restored {} from {}", self.config_path(), backup.display());
        self.regenerate(host).await
    }
}

impl fmt::Display for Bootloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check every known family in fixed order and keep the installed ones.
///
/// An empty result is a valid state (manual configuration needed), not an error.
pub fn detect(host: &Host) -> Vec<Bootloader> {
    Bootloader::ALL
        .iter()
        .copied()
        .filter(|b| b.is_installed(host))
        .collect()
}
