//! Kernel and bootloader configuration.

use crate::bootloader::{self, Bootloader};
use crate::error::InstallError;
use crate::hardware::{detect_kernel_release, detect_ram_gb, KernelVersion};
use crate::orchestrator::{Stage, StageContext};
use crate::platform::{QuirkKind, REQUIRED_KERNEL_PARAMS};
use crate::system::Systemctl;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Mutex;

/// Oldest kernel with the platform's parameter support.
pub const MIN_KERNEL: KernelVersion = KernelVersion::new(6, 18);

/// At or above this much RAM the compressed swap device is disabled.
pub const ZRAM_DISABLE_THRESHOLD_GB: u64 = 64;

pub const ZRAM_UNIT: &str = "zram-generator@zram0.service";

/// Verifies the kernel version, adds the required kernel parameters to every
/// active bootloader, applies device quirks and tunes zram for large-memory
/// systems.
///
/// Only the kernel version check fails the stage. Everything after it degrades
/// to warnings.
#[derive(Default)]
pub struct KernelStage {
    backups: Mutex<Vec<(Bootloader, PathBuf)>>,
}

impl KernelStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_backups(&self) -> Vec<(Bootloader, PathBuf)> {
        self.backups
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .unwrap_or_default()
    }

    fn remember_backup(&self, loader: Bootloader, path: PathBuf) {
        if let Ok(mut backups) = self.backups.lock() {
            backups.push((loader, path));
        }
    }

    async fn check_kernel(&self, ctx: &StageContext) -> Result<(), InstallError> {
        ctx.progress(10, "Checking kernel version...");
        let release = detect_kernel_release(&ctx.host).await?;
        let version = KernelVersion::parse(&release);
        ctx.info(format!("Kernel version: {} (parsed: {})", release, version));

        if !version.at_least(MIN_KERNEL) {
            return Err(InstallError::KernelTooOld {
                found: release,
                required: MIN_KERNEL.to_string(),
            });
        }
        ctx.info("Kernel version meets requirements");
        Ok(())
    }

    /// Returns the number of warnings raised.
    async fn configure_bootloaders(&self, ctx: &StageContext) -> Result<usize, InstallError> {
        let loaders = bootloader::detect(&ctx.host);
        if loaders.is_empty() {
            ctx.warn("No supported bootloader detected (checked: GRUB, systemd-boot, Limine, rEFInd)");
            ctx.warn(format!(
                "MANUAL ACTION REQUIRED: add '{}' to your kernel arguments",
                REQUIRED_KERNEL_PARAMS.join(" ")
            ));
            return Ok(1);
        }

        ctx.info(format!("Detected {} active bootloader(s)", loaders.len()));
        let mut warnings = 0;
        let n = loaders.len() as u32;
        for (i, loader) in loaders.iter().enumerate() {
            // Spread 20..55% across loaders so progress stays monotonic.
            let base = 20 + (35 * i as u32 / n) as u8;
            let half = (35 / (2 * n)) as u8;
            ctx.info(format!("Configuring: {}", loader));

            ctx.progress(base, format!("Backing up {} config...", loader));
            match loader.backup(&ctx.host).await {
                Ok(path) => {
                    ctx.info(format!("Backup created: {}", path.display()));
                    self.remember_backup(*loader, path);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warnings += 1;
                    ctx.warn(format!("Could not backup {}: {}", loader, e));
                }
            }

            ctx.progress(base + half, format!("Adding kernel parameters to {}...", loader));
            for param in REQUIRED_KERNEL_PARAMS {
                match loader.add_param(&ctx.host, param).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warnings += 1;
                        ctx.warn(format!("Failed to add {} to {}: {}", param, loader, e));
                    }
                }
            }
        }
        Ok(warnings)
    }

    async fn apply_quirks(&self, ctx: &StageContext) -> Result<usize, InstallError> {
        ctx.progress(60, "Applying device quirks...");
        let device = match &ctx.device {
            Some(d) => d,
            None => {
                ctx.info("No recognised device; no device quirks to apply");
                return Ok(0);
            }
        };

        let mut warnings = 0;
        for quirk in device.quirks() {
            match quirk.kind {
                QuirkKind::Auto(_) => {
                    ctx.info(format!("Applying quirk: {}", quirk.description));
                    match quirk.apply(&ctx.host).await {
                        Ok(()) => {}
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            warnings += 1;
                            ctx.warn(format!("Quirk failed: {}", e));
                        }
                    }
                }
                QuirkKind::Advisory => ctx.warn(format!("ADVISORY: {}", quirk.description)),
            }
        }
        Ok(warnings)
    }

    async fn tune_zram(&self, ctx: &StageContext) -> Result<usize, InstallError> {
        ctx.progress(75, "Checking ZRAM config...");
        let ram_gb = match detect_ram_gb(&ctx.host) {
            Ok(gb) => gb,
            Err(e) => {
                ctx.warn(format!(
                    "Could not determine system RAM: {}. Skipping ZRAM optimization.",
                    e
                ));
                return Ok(1);
            }
        };

        if ram_gb < ZRAM_DISABLE_THRESHOLD_GB {
            ctx.info(format!(
                "System memory {} GB < {} GB. Keeping ZRAM enabled.",
                ram_gb, ZRAM_DISABLE_THRESHOLD_GB
            ));
            return Ok(0);
        }

        ctx.info(format!(
            "High memory system ({} GB) detected. Disabling ZRAM to prevent GTT conflicts.",
            ram_gb
        ));
        match Systemctl::disable_now(&ctx.host, ZRAM_UNIT).await {
            Ok(true) => {
                ctx.info("ZRAM disabled");
                Ok(0)
            }
            Ok(false) => {
                ctx.info(format!("{} not present; nothing to disable", ZRAM_UNIT));
                Ok(0)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                ctx.warn(format!("Failed to disable ZRAM (might not be active): {}", e));
                Ok(1)
            }
        }
    }
}

impl Stage for KernelStage {
    fn id(&self) -> &str {
        "kernel"
    }

    fn name(&self) -> &str {
        "Kernel Configuration"
    }

    fn description(&self) -> &str {
        "Verify kernel version, configure bootloaders, apply device quirks"
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            self.take_backups();
            self.check_kernel(ctx).await?;

            let mut warnings = self.configure_bootloaders(ctx).await?;
            warnings += self.apply_quirks(ctx).await?;
            warnings += self.tune_zram(ctx).await?;

            ctx.progress(100, "Kernel configuration complete");
            if warnings > 0 {
                ctx.warn(format!("Completed with {} warning(s); review the log above", warnings));
            }
            ctx.info("NOTE: Reboot may be required for kernel parameter changes");
            Ok(())
        })
    }

    /// Restore every bootloader backup taken during this run, newest first.
    fn rollback<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            let backups = self.take_backups();
            if backups.is_empty() {
                ctx.info("No bootloader backups to restore");
                return Ok(());
            }
            let mut last_err = None;
            for (loader, path) in backups.into_iter().rev() {
                match loader.restore(&ctx.host, &path).await {
                    Ok(()) => ctx.info(format!("Restored {} from {}", loader, path.display())),
                    Err(e) => {
                        ctx.warn(format!("Could not restore {}: {}", loader, e));
                        last_err = Some(e);
                    }
                }
            }
            match last_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}
