//! Strix Halo installation stages.

pub mod containers;
pub mod kernel;
pub mod verify;

pub use containers::ContainerStage;
pub use kernel::{KernelStage, MIN_KERNEL, ZRAM_DISABLE_THRESHOLD_GB, ZRAM_UNIT};
pub use verify::VerifyStage;
