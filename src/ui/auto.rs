//! Unattended front end: narrates to stdout and answers every prompt with its default.

use crate::models::{LogLevel, StageInfo, StageResult, StageStatus};
use crate::ui::UiSink;
use console::{style, Term};

pub struct AutoSink {
    term: Term,
}

impl AutoSink {
    pub fn new() -> Self {
        AutoSink {
            term: Term::stdout(),
        }
    }

    fn line(&self, text: String) {
        let _ = self.term.write_line(&text);
    }
}

impl Default for AutoSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a log line with a severity tag.
pub fn format_log(level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info => format!("  {}", message),
        LogLevel::Warn => format!("  {} {}", style("WARN").yellow().bold(), message),
        LogLevel::Error => format!("  {} {}", style("ERROR").red().bold(), message),
    }
}

pub fn format_result(result: &StageResult) -> String {
    let status = match result.status {
        StageStatus::Success => style("done").green().to_string(),
        StageStatus::Failed => style("FAILED").red().bold().to_string(),
        StageStatus::Skipped => style("skipped").dim().to_string(),
    };
    match &result.error {
        Some(detail) => format!("<< {}: {} ({})", result.stage_name, status, detail),
        None => format!("<< {}: {}", result.stage_name, status),
    }
}

impl UiSink for AutoSink {
    fn stage_start(&self, stage: &StageInfo) {
        self.line(format!(">> {}", style(&stage.name).cyan().bold()));
    }

    fn stage_complete(&self, result: &StageResult) {
        self.line(format_result(result));
    }

    fn progress(&self, percent: u8, message: &str) {
        self.line(format!("  [{:>3}%] {}", percent, message));
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.line(format_log(level, message));
    }

    fn confirm(&self, message: &str, default: bool) -> bool {
        self.line(format!(
            "  {} {} -> {}",
            style("?").cyan(),
            message,
            if default { "yes" } else { "no" }
        ));
        default
    }

    fn select(&self, message: &str, options: &[String], default: usize) -> usize {
        let choice = options.get(default).map(String::as_str).unwrap_or("<none>");
        self.line(format!("  {} {} -> {}", style("?").cyan(), message, choice));
        default
    }

    fn input(&self, message: &str, default: &str) -> String {
        self.line(format!("  {} {} -> {:?}", style("?").cyan(), message, default));
        default.to_string()
    }
}
