//! Run state and phase tracking for one engine run.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::models::StageResult;

/// Lifecycle of a single engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }

    /// All valid phase transitions FROM this phase.
    ///
    /// A finished run is terminal; a new attempt builds a new engine.
    pub fn valid_next_phases(&self) -> &'static [RunPhase] {
        match self {
            RunPhase::Idle => &[RunPhase::Running],
            RunPhase::Running => &[RunPhase::Completed, RunPhase::Failed],
            RunPhase::Completed | RunPhase::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

/// Snapshot of an engine run, readable by front ends while it progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub phase: RunPhase,
    /// Index into the engine's stage list of the stage being processed.
    pub current_stage: Option<usize>,
    pub dry_run: bool,
    pub results: Vec<StageResult>,
    pub error: Option<String>,
    pub start_time: Option<SystemTime>,
    pub last_update_time: SystemTime,
}

impl RunState {
    pub fn new(dry_run: bool) -> Self {
        RunState {
            phase: RunPhase::Idle,
            current_stage: None,
            dry_run,
            results: Vec::new(),
            error: None,
            start_time: None,
            last_update_time: SystemTime::now(),
        }
    }

    pub fn transition_to(&mut self, next: RunPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next) {
            return Err(format!(
                "Invalid run transition: {} -> {}",
                self.phase.as_str(),
                next.as_str()
            ));
        }
        if next == RunPhase::Running {
            self.start_time = Some(SystemTime::now());
        }
        if next.is_finished() {
            self.current_stage = None;
        }
        self.phase = next;
        self.last_update_time = SystemTime::now();
        Ok(())
    }

    pub fn enter_stage(&mut self, index: usize) {
        self.current_stage = Some(index);
        self.last_update_time = SystemTime::now();
    }

    pub fn record(&mut self, result: StageResult) {
        self.results.push(result);
        self.last_update_time = SystemTime::now();
    }

    /// Record the aborting error and move to `Failed`.
    pub fn record_error(&mut self, error: String) {
        self.error = Some(error);
        self.current_stage = None;
        self.phase = RunPhase::Failed;
        self.last_update_time = SystemTime::now();
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(false)
    }
}
