//! Host metadata detection.
//!
//! Everything here reads through a [`Host`](crate::system::Host), so tests point
//! the same code at a scratch directory laid out like `/proc` and `/sys`.

pub mod cpu;
pub mod dmi;
pub mod kernel;
pub mod ram;

pub use cpu::{detect_cpu_model, is_strix_halo_cpu};
pub use dmi::{read_dmi_identity, DmiIdentity};
pub use kernel::{detect_kernel_release, KernelVersion};
pub use ram::detect_ram_gb;

use crate::system::Host;
use serde::{Deserialize, Serialize};

/// Snapshot of host facts shown by `--detect` and the front-end headers.
///
/// Each field degrades independently: a failed read leaves a placeholder
/// rather than failing the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostProfile {
    pub kernel_release: String,
    pub ram_gb: u64,
    pub cpu_model: String,
    pub dmi: DmiIdentity,
    pub efi: bool,
}

impl HostProfile {
    pub async fn detect(host: &Host) -> Self {
        let kernel_release = detect_kernel_release(host)
            .await
            .unwrap_or_else(|e| {
                log::warn!("[Hardware] Kernel release: {}", e);
                "unknown".to_string()
            });
        let ram_gb = detect_ram_gb(host).unwrap_or_else(|e| {
            log::warn!("[Hardware] {}", e);
            0
        });

        HostProfile {
            kernel_release,
            ram_gb,
            cpu_model: detect_cpu_model(host),
            dmi: read_dmi_identity(host),
            efi: is_efi(host),
        }
    }

    pub fn is_strix_halo(&self) -> bool {
        is_strix_halo_cpu(&self.cpu_model)
    }
}

/// Booted through UEFI firmware.
pub fn is_efi(host: &Host) -> bool {
    host.exists("/sys/firmware/efi")
}
