//! Post-install verification of the running kernel command line.

use crate::bootloader;
use crate::error::InstallError;
use crate::orchestrator::{Stage, StageContext};
use crate::platform::REQUIRED_KERNEL_PARAMS;
use futures::future::BoxFuture;

pub const CMDLINE_PATH: &str = "/proc/cmdline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamState {
    /// Present on the running kernel.
    Active,
    /// Written to at least one bootloader config; takes effect after reboot.
    PendingReboot,
    Missing,
}

/// Whether `param` appears as a whole token on the command line.
pub fn cmdline_has(cmdline: &str, param: &str) -> bool {
    cmdline.split_whitespace().any(|token| token == param)
}

#[derive(Default)]
pub struct VerifyStage;

impl VerifyStage {
    pub fn new() -> Self {
        VerifyStage
    }
}

impl Stage for VerifyStage {
    fn id(&self) -> &str {
        "verify"
    }

    fn name(&self) -> &str {
        "Post-install Verification"
    }

    fn description(&self) -> &str {
        "Check which kernel parameters are active and which wait for a reboot"
    }

    fn optional(&self) -> bool {
        true
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            ctx.progress(20, "Reading running kernel command line...");
            let cmdline = ctx.host.read_to_string(CMDLINE_PATH).unwrap_or_else(|e| {
                ctx.warn(format!("Could not read {}: {}", CMDLINE_PATH, e));
                String::new()
            });

            ctx.progress(60, "Checking bootloader configuration...");
            let loaders = bootloader::detect(&ctx.host);
            let mut missing = Vec::new();
            for param in REQUIRED_KERNEL_PARAMS {
                let state = if cmdline_has(&cmdline, param) {
                    ParamState::Active
                } else if loaders
                    .iter()
                    .any(|l| l.has_param(&ctx.host, param).unwrap_or(false))
                {
                    ParamState::PendingReboot
                } else {
                    ParamState::Missing
                };

                match state {
                    ParamState::Active => ctx.info(format!("{}: active", param)),
                    ParamState::PendingReboot => {
                        ctx.info(format!("{}: configured, active after reboot", param))
                    }
                    ParamState::Missing => {
                        ctx.warn(format!("{}: not configured", param));
                        missing.push(param);
                    }
                }
            }

            ctx.progress(100, "Verification complete");
            if !missing.is_empty() && loaders.is_empty() {
                return Err(InstallError::StageFailed {
                    stage: self.id().to_string(),
                    reason: format!(
                        "no active bootloader and {} missing from the running kernel",
                        missing.join(", ")
                    ),
                });
            }
            Ok(())
        })
    }
}
