//! Core data types for Strixforge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome status of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage within a single engine run.
///
/// Created once per stage per run and never mutated afterwards. The error
/// detail is kept as rendered text so results can be cloned to every front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub stage_name: String,
    pub status: StageStatus,
    pub error: Option<String>,
}

impl StageResult {
    pub fn success(stage_id: &str, stage_name: &str) -> Self {
        StageResult {
            stage_id: stage_id.to_string(),
            stage_name: stage_name.to_string(),
            status: StageStatus::Success,
            error: None,
        }
    }

    pub fn failed(stage_id: &str, stage_name: &str, error: impl fmt::Display) -> Self {
        StageResult {
            stage_id: stage_id.to_string(),
            stage_name: stage_name.to_string(),
            status: StageStatus::Failed,
            error: Some(error.to_string()),
        }
    }

    /// A skipped result keeps its reason in `error` for display, status stays `Skipped`.
    pub fn skipped(stage_id: &str, stage_name: &str, reason: impl Into<String>) -> Self {
        StageResult {
            stage_id: stage_id.to_string(),
            stage_name: stage_name.to_string(),
            status: StageStatus::Skipped,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

/// Severity for narration through the UI sink log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Map onto the `log` facade level used for the persisted transcript.
    pub fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Static description of a stage, cloned out to front ends for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub optional: bool,
}

/// Aggregate outcome of a completed engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub results: Vec<StageResult>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn count(&self, status: StageStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True when any stage failed, including optional ones that did not abort the run.
    pub fn has_failures(&self) -> bool {
        self.count(StageStatus::Failed) > 0
    }
}
