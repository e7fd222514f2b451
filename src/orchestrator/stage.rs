//! The Stage seam: one unit of the installation pipeline.

use crate::config::InstallerSettings;
use crate::error::InstallError;
use crate::models::{LogLevel, StageInfo};
use crate::platform::Device;
use crate::system::Host;
use crate::ui::SharedSink;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Everything a stage may touch during one run.
///
/// `host` is already wrapped for dry-run and bound to the run's cancel signal.
#[derive(Clone)]
pub struct StageContext {
    pub host: Host,
    pub ui: SharedSink,
    pub device: Option<Arc<Device>>,
    pub settings: Arc<InstallerSettings>,
    pub dry_run: bool,
}

impl StageContext {
    pub fn progress(&self, percent: u8, message: impl AsRef<str>) {
        self.ui.progress(percent.min(100), message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.ui.log(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.ui.log(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.ui.log(LogLevel::Error, message.as_ref());
    }
}

/// One pipeline step.
///
/// `run` is invoked at most once per engine run. `rollback` is best-effort and
/// only called for stages whose `run` succeeded in the same engine run.
pub trait Stage: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// A failing optional stage is recorded but does not abort the pipeline.
    fn optional(&self) -> bool {
        false
    }

    /// Stages that only make sense on a recognised device are skipped without one.
    fn requires_device(&self) -> bool {
        false
    }

    fn info(&self) -> StageInfo {
        StageInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            optional: self.optional(),
        }
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>>;

    fn rollback<'a>(&'a self, _ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async { Ok(()) })
    }
}
