//! Strix Halo platform: device registry and the ordered stage list.

pub mod device;
pub mod stages;

pub use device::{detect as detect_device, identify, known_devices, Device, Quirk, QuirkAction, QuirkKind};
pub use stages::{ContainerStage, KernelStage, VerifyStage};

use crate::orchestrator::Stage;

/// Kernel parameters every Strix Halo install needs.
pub const REQUIRED_KERNEL_PARAMS: [&str; 2] = ["iommu=pt", "amd_pstate=active"];

/// The platform's stages in execution order.
pub fn strix_halo_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(KernelStage::new()),
        Box::new(ContainerStage::new()),
        Box::new(VerifyStage::new()),
    ]
}
