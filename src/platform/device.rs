//! Device model, quirk data and the registry of known Strix Halo machines.

use crate::bootloader;
use crate::error::{DeviceError, InstallError};
use crate::hardware::{read_dmi_identity, DmiIdentity};
use crate::system::{Host, Pacman, Yay};
use serde::Serialize;
use std::fmt;

/// Corrective action an `Auto` quirk performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuirkAction {
    /// Add a kernel parameter to every active bootloader.
    KernelParam(&'static str),
    /// Install a package through the AUR helper unless pacman already has it.
    AurPackage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuirkKind {
    /// Applied by the kernel stage without asking.
    Auto(QuirkAction),
    /// Only shown to the operator; never executed.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quirk {
    pub id: &'static str,
    pub description: &'static str,
    pub kind: QuirkKind,
}

impl Quirk {
    pub fn is_auto(&self) -> bool {
        matches!(self.kind, QuirkKind::Auto(_))
    }

    /// Execute an `Auto` quirk. Advisory quirks have nothing to execute.
    pub async fn apply(&self, host: &Host) -> Result<(), InstallError> {
        let action = match &self.kind {
            QuirkKind::Auto(action) => action,
            QuirkKind::Advisory => return Ok(()),
        };
        match action {
            QuirkAction::KernelParam(param) => {
                let loaders = bootloader::detect(host);
                if loaders.is_empty() {
                    log::info!("[Quirk] {}: no managed bootloader, skipping", self.id);
                    return Ok(());
                }
                // Every loader is attempted; the last failure is reported.
                let mut last_err = None;
                for loader in loaders {
                    if let Err(e) = loader.add_param(host, param).await {
                        if e.is_cancelled() {
                            return Err(e);
                        }
                        log::warn!("[Quirk] {}: {} on {}: {}", self.id, param, loader, e);
                        last_err = Some(e);
                    }
                }
                match last_err {
                    Some(e) => Err(DeviceError::QuirkFailed {
                        id: self.id.to_string(),
                        reason: e.to_string(),
                    }
                    .into()),
                    None => Ok(()),
                }
            }
            QuirkAction::AurPackage(package) => {
                if Pacman::is_installed(host, package).await? {
                    log::info!("[Quirk] {}: {} already installed", self.id, package);
                    return Ok(());
                }
                Yay::install(host, package).await.map_err(|e| match e {
                    InstallError::Cancelled => InstallError::Cancelled,
                    other => DeviceError::QuirkFailed {
                        id: self.id.to_string(),
                        reason: other.to_string(),
                    }
                    .into(),
                })
            }
        }
    }
}

/// A recognised hardware platform. Quirks are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    name: &'static str,
    manufacturer: String,
    product: String,
    quirks: Vec<Quirk>,
}

impl Device {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn quirks(&self) -> &[Quirk] {
        &self.quirks
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.manufacturer, self.product)
    }
}

struct DeviceEntry {
    name: &'static str,
    vendor_patterns: &'static [&'static str],
    product_patterns: &'static [&'static str],
    quirks: fn() -> Vec<Quirk>,
}

impl DeviceEntry {
    fn matches(&self, identity: &DmiIdentity) -> bool {
        let vendor = identity.manufacturer.to_lowercase();
        let product = identity.product.to_lowercase();
        self.vendor_patterns.iter().any(|p| vendor.contains(p))
            && self.product_patterns.iter().any(|p| product.contains(p))
    }
}

const UMA_ADVISORY: &str = "Set the iGPU memory (UMA frame buffer) allocation in firmware setup; \
     the installer cannot change it";

fn beelink_gtr9_quirks() -> Vec<Quirk> {
    vec![
        Quirk {
            id: "e610-blacklist",
            description: "Blacklist Intel E610 Ethernet driver (crashes under GPU load)",
            kind: QuirkKind::Auto(QuirkAction::KernelParam("modprobe.blacklist=ice")),
        },
        Quirk {
            id: "tdp-tool",
            description: "Install RyzenAdj for TDP control",
            kind: QuirkKind::Auto(QuirkAction::AurPackage("ryzenadj")),
        },
    ]
}

fn framework_desktop_quirks() -> Vec<Quirk> {
    vec![Quirk {
        id: "uma-allocation",
        description: UMA_ADVISORY,
        kind: QuirkKind::Advisory,
    }]
}

fn gmktec_evo_x2_quirks() -> Vec<Quirk> {
    vec![Quirk {
        id: "uma-allocation",
        description: UMA_ADVISORY,
        kind: QuirkKind::Advisory,
    }]
}

static REGISTRY: &[DeviceEntry] = &[
    DeviceEntry {
        name: "Beelink GTR9 Pro",
        vendor_patterns: &["beelink"],
        product_patterns: &["gtr9"],
        quirks: beelink_gtr9_quirks,
    },
    DeviceEntry {
        name: "Framework Desktop",
        vendor_patterns: &["framework"],
        product_patterns: &["desktop"],
        quirks: framework_desktop_quirks,
    },
    DeviceEntry {
        name: "GMKtec EVO-X2",
        vendor_patterns: &["gmktec"],
        product_patterns: &["evo-x2", "evo x2"],
        quirks: gmktec_evo_x2_quirks,
    },
];

/// Names of every device the registry knows, in match order.
pub fn known_devices() -> Vec<&'static str> {
    REGISTRY.iter().map(|e| e.name).collect()
}

/// Resolve firmware identity strings to a known device.
pub fn identify(identity: &DmiIdentity) -> Result<Device, DeviceError> {
    REGISTRY
        .iter()
        .find(|entry| entry.matches(identity))
        .map(|entry| Device {
            name: entry.name,
            manufacturer: identity.manufacturer.clone(),
            product: identity.product.clone(),
            quirks: (entry.quirks)(),
        })
        .ok_or_else(|| DeviceError::Unrecognized {
            manufacturer: identity.manufacturer.clone(),
            product: identity.product.clone(),
        })
}

/// Read the host's DMI identity and resolve it.
///
/// Callers treat `Unrecognized` as "no device", not as a pipeline failure.
pub fn detect(host: &Host) -> Result<Device, DeviceError> {
    let identity = read_dmi_identity(host);
    let device = identify(&identity)?;
    log::info!("[Device] Detected {}", device);
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_beelink_case_insensitive() {
        let device = identify(&DmiIdentity::new("BEELINK", "GTR9 Pro")).unwrap();
        assert_eq!(device.name(), "Beelink GTR9 Pro");
        let ids: Vec<_> = device.quirks().iter().map(|q| q.id).collect();
        assert_eq!(ids, vec!["e610-blacklist", "tdp-tool"]);
        assert!(device.quirks().iter().all(Quirk::is_auto));
    }

    #[test]
    fn test_identify_advisory_devices() {
        let fw = identify(&DmiIdentity::new("Framework", "Desktop (AMD Ryzen AI Max 300 Series)")).unwrap();
        assert_eq!(fw.name(), "Framework Desktop");
        assert!(!fw.quirks()[0].is_auto());

        let gmk = identify(&DmiIdentity::new("GMKtec", "EVO-X2")).unwrap();
        assert_eq!(gmk.name(), "GMKtec EVO-X2");
        assert_eq!(gmk.quirks()[0].kind, QuirkKind::Advisory);
    }

    #[test]
    fn test_identify_requires_both_fields() {
        assert!(identify(&DmiIdentity::new("Beelink", "SER8")).is_err());
        let err = identify(&DmiIdentity::new("QEMU", "Standard PC (Q35 + ICH9, 2009)")).unwrap_err();
        assert!(matches!(err, DeviceError::Unrecognized { .. }));
        assert!(identify(&DmiIdentity::default()).is_err());
    }

    #[test]
    fn test_known_devices_order() {
        assert_eq!(
            known_devices(),
            vec!["Beelink GTR9 Pro", "Framework Desktop", "GMKtec EVO-X2"]
        );
    }
}
