//! Stage orchestration: runs the platform's stages in declaration order.

pub mod stage;
pub mod state;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use stage::{Stage, StageContext};
pub use state::{RunPhase, RunState};

use crate::config::InstallerSettings;
use crate::error::InstallError;
use crate::log_parsed;
use crate::models::{LogLevel, RunSummary, StageInfo, StageResult};
use crate::platform::Device;
use crate::system::{CancelSignal, Host};
use crate::ui::{LoggingSink, SharedSink};

/// Sequences stages, collects one result per stage, and applies the
/// pipeline policies (dry-run, skip set, abort on required failure,
/// optional rollback).
pub struct Engine {
    stages: Vec<Box<dyn Stage>>,
    host: Host,
    ui: SharedSink,
    device: Option<Arc<Device>>,
    settings: Arc<InstallerSettings>,
    dry_run: bool,
    skipped: HashSet<String>,
    rollback_on_failure: bool,
    state: Arc<RwLock<RunState>>,
}

impl Engine {
    /// Build an engine for one installation attempt.
    ///
    /// Skip set and rollback policy start from `settings`; `ui` is wrapped so
    /// every callback is also written to the log.
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        host: Host,
        ui: SharedSink,
        device: Option<Device>,
        settings: InstallerSettings,
    ) -> Self {
        let skipped = settings.skip_stages.iter().cloned().collect();
        let rollback_on_failure = settings.rollback_on_failure;
        Engine {
            stages,
            host,
            ui: Arc::new(LoggingSink::new(ui)),
            device: device.map(Arc::new),
            settings: Arc::new(settings),
            dry_run: false,
            skipped,
            rollback_on_failure,
            state: Arc::new(RwLock::new(RunState::new(false))),
        }
    }

    /// Must be set before `run`.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Add stage ids to skip. Unknown ids are ignored with a warning.
    pub fn set_skipped<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if !self.stages.iter().any(|s| s.id() == id) {
                log::warn!("[Engine] Ignoring unknown stage id '{}'", id);
                continue;
            }
            self.skipped.insert(id);
        }
    }

    pub fn set_rollback_on_failure(&mut self, enabled: bool) {
        self.rollback_on_failure = enabled;
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_deref()
    }

    pub fn stage_infos(&self) -> Vec<StageInfo> {
        self.stages.iter().map(|s| s.info()).collect()
    }

    /// Shared handle for front ends that poll progress.
    pub fn state_handle(&self) -> Arc<RwLock<RunState>> {
        self.state.clone()
    }

    pub async fn results(&self) -> Vec<StageResult> {
        self.state.read().await.results.clone()
    }

    fn context(&self, cancel: CancelSignal) -> StageContext {
        let host = if self.dry_run {
            self.host.dry_run()
        } else {
            self.host.clone()
        };
        StageContext {
            host: host.with_cancel(cancel),
            ui: self.ui.clone(),
            device: self.device.clone(),
            settings: self.settings.clone(),
            dry_run: self.dry_run,
        }
    }

    async fn record(&self, result: StageResult) {
        self.ui.stage_complete(&result);
        self.state.write().await.record(result);
    }

    /// Run every stage in order.
    ///
    /// Returns the aborting error when a required stage fails (or the run is
    /// cancelled); optional stage failures are recorded and the run continues.
    pub async fn run(&self, cancel: CancelSignal) -> Result<RunSummary, InstallError> {
        {
            let mut state = self.state.write().await;
            state.dry_run = self.dry_run;
            state.transition_to(RunPhase::Running).map_err(InstallError::State)?;
        }

        let ctx = self.context(cancel.clone());
        log_parsed!(
            "[Engine] Run started: {} stage(s){}",
            self.stages.len(),
            if self.dry_run { " [DRY-RUN]" } else { "" }
        );
        if self.dry_run {
            self.ui.log(LogLevel::Info, "Dry run: no changes will be made to this system");
        }

        let mut completed: Vec<usize> = Vec::new();

        for (index, stage) in self.stages.iter().enumerate() {
            self.state.write().await.enter_stage(index);

            if self.skipped.contains(stage.id()) {
                self.record(StageResult::skipped(stage.id(), stage.name(), "deselected"))
                    .await;
                continue;
            }
            if stage.requires_device() && self.device.is_none() {
                self.record(StageResult::skipped(
                    stage.id(),
                    stage.name(),
                    "no supported device detected",
                ))
                .await;
                continue;
            }

            self.ui.stage_start(&stage.info());
            let outcome = match cancel.check() {
                Ok(()) => stage.run(&ctx).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    self.record(StageResult::success(stage.id(), stage.name())).await;
                    completed.push(index);
                }
                Err(e) => {
                    self.ui.log(LogLevel::Error, &format!("{} failed: {}", stage.name(), e));
                    self.record(StageResult::failed(stage.id(), stage.name(), &e)).await;

                    if stage.optional() && !e.is_cancelled() {
                        self.ui.log(
                            LogLevel::Warn,
                            &format!("{} is optional; continuing", stage.name()),
                        );
                        continue;
                    }

                    self.abort(index, &completed, &ctx, &e).await;
                    return Err(e);
                }
            }
        }

        let mut state = self.state.write().await;
        state.transition_to(RunPhase::Completed).map_err(InstallError::State)?;
        log_parsed!("[Engine] Run completed");
        Ok(RunSummary {
            results: state.results.clone(),
            dry_run: self.dry_run,
        })
    }

    /// Record the remaining stages as skipped and optionally roll back.
    async fn abort(&self, failed: usize, completed: &[usize], ctx: &StageContext, error: &InstallError) {
        for stage in &self.stages[failed + 1..] {
            self.record(StageResult::skipped(stage.id(), stage.name(), "pipeline aborted"))
                .await;
        }

        if self.rollback_on_failure && !completed.is_empty() {
            self.rollback(completed, ctx).await;
        }

        self.state.write().await.record_error(error.to_string());
        log_parsed!("[Engine] Run aborted at stage {}: {}", self.stages[failed].id(), error);
    }

    /// Roll back the given stages in reverse order. Failures are logged, not returned.
    async fn rollback(&self, completed: &[usize], ctx: &StageContext) {
        // Rollback must still run after a cancellation aborted the pipeline.
        let rollback_ctx = StageContext {
            host: ctx.host.with_cancel(CancelSignal::never()),
            ..ctx.clone()
        };
        for &index in completed.iter().rev() {
            let stage = &self.stages[index];
            self.ui
                .log(LogLevel::Info, &format!("Rolling back {}", stage.name()));
            if let Err(e) = stage.rollback(&rollback_ctx).await {
                self.ui.log(
                    LogLevel::Warn,
                    &format!("Rollback of {} failed: {}", stage.name(), e),
                );
            }
        }
    }
}
