//! UI Module - the sink contract and its front ends.
//!
//! The engine and every stage talk only to [`UiSink`]. Four front ends
//! implement it: unattended ([`auto`]), interactive terminal ([`terminal`]),
//! and the two remote front ends ([`app`] for the native window, [`web`] for
//! the browser) which share [`channel::ChannelSink`].

pub mod app;
pub mod auto;
pub mod channel;
pub mod terminal;
pub mod web;

use crate::log_parsed;
use crate::models::{LogLevel, StageInfo, StageResult};
use std::sync::Arc;

pub use app::InstallerApp;
pub use auto::AutoSink;
pub use channel::{ChannelSink, InstallEvent, PromptReply, PromptRequest};
pub use terminal::TerminalSink;

/// Capability set every front end provides to the pipeline.
///
/// Notifications are fire-and-forget. Prompts block the calling stage until
/// the front end answers.
pub trait UiSink: Send + Sync {
    fn stage_start(&self, stage: &StageInfo);
    fn stage_complete(&self, result: &StageResult);

    /// `percent` is 0..=100 within the current stage.
    fn progress(&self, percent: u8, message: &str);
    fn log(&self, level: LogLevel, message: &str);

    fn confirm(&self, message: &str, default: bool) -> bool;

    /// Returns an index into `options`. Out-of-range answers fall back to `default`.
    fn select(&self, message: &str, options: &[String], default: usize) -> usize;

    fn input(&self, message: &str, default: &str) -> String;
}

/// Whether a graphical session is reachable, judged from `DISPLAY` and
/// `WAYLAND_DISPLAY` as looked up through `var`.
pub fn graphical_session<F>(var: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|name| var(name).map_or(false, |v| !v.trim().is_empty()))
}

/// Shared handle passed through the engine and stages.
pub type SharedSink = Arc<dyn UiSink>;

/// Wraps a front end and mirrors every callback into the `log` facade, so a
/// persisted transcript exists whichever front end is active.
pub struct LoggingSink {
    inner: SharedSink,
}

impl LoggingSink {
    pub fn new(inner: SharedSink) -> Self {
        LoggingSink { inner }
    }
}

impl UiSink for LoggingSink {
    fn stage_start(&self, stage: &StageInfo) {
        log_parsed!("[Stage] Starting: {} ({})", stage.name, stage.id);
        self.inner.stage_start(stage);
    }

    fn stage_complete(&self, result: &StageResult) {
        match &result.error {
            Some(detail) => log_parsed!(
                "[Stage] {}: {} ({})",
                result.stage_name,
                result.status,
                detail
            ),
            None => log_parsed!("[Stage] {}: {}", result.stage_name, result.status),
        }
        self.inner.stage_complete(result);
    }

    fn progress(&self, percent: u8, message: &str) {
        log::info!("[Progress] {:>3}% {}", percent, message);
        self.inner.progress(percent, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        log::log!(level.to_log_level(), "{}", message);
        self.inner.log(level, message);
    }

    fn confirm(&self, message: &str, default: bool) -> bool {
        let answer = self.inner.confirm(message, default);
        log::info!("[Prompt] {} -> {}", message, if answer { "yes" } else { "no" });
        answer
    }

    fn select(&self, message: &str, options: &[String], default: usize) -> usize {
        let mut answer = self.inner.select(message, options, default);
        if answer >= options.len() {
            answer = default;
        }
        log::info!(
            "[Prompt] {} -> {}",
            message,
            options.get(answer).map(String::as_str).unwrap_or("<none>")
        );
        answer
    }

    fn input(&self, message: &str, default: &str) -> String {
        let answer = self.inner.input(message, default);
        log::info!("[Prompt] {} -> {:?}", message, answer);
        answer
    }
}

/// Records every callback. Prompts answer with their defaults.
///
/// Used by the engine and stage tests.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl UiSink for RecordingSink {
    fn stage_start(&self, stage: &StageInfo) {
        self.push(format!("start:{}", stage.id));
    }

    fn stage_complete(&self, result: &StageResult) {
        self.push(format!("complete:{}:{}", result.stage_id, result.status));
    }

    fn progress(&self, percent: u8, message: &str) {
        self.push(format!("progress:{}:{}", percent, message));
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.push(format!("log:{}:{}", level.as_str(), message));
    }

    fn confirm(&self, message: &str, default: bool) -> bool {
        self.push(format!("confirm:{}", message));
        default
    }

    fn select(&self, message: &str, _options: &[String], default: usize) -> usize {
        self.push(format!("select:{}", message));
        default
    }

    fn input(&self, message: &str, default: &str) -> String {
        self.push(format!("input:{}", message));
        default.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphical_session_from_either_variable() {
        assert!(graphical_session(|k| (k == "DISPLAY").then(|| ":0".to_string())));
        assert!(graphical_session(|k| (k == "WAYLAND_DISPLAY").then(|| "wayland-1".to_string())));
        assert!(!graphical_session(|k| (k == "DISPLAY").then(String::new)));
        assert!(!graphical_session(|_| None));
    }

    struct OutOfRange;

    impl UiSink for OutOfRange {
        fn stage_start(&self, _stage: &StageInfo) {}
        fn stage_complete(&self, _result: &StageResult) {}
        fn progress(&self, _percent: u8, _message: &str) {}
        fn log(&self, _level: LogLevel, _message: &str) {}
        fn confirm(&self, _message: &str, default: bool) -> bool {
            default
        }
        fn select(&self, _message: &str, _options: &[String], _default: usize) -> usize {
            99
        }
        fn input(&self, _message: &str, default: &str) -> String {
            default.to_string()
        }
    }

    #[test]
    fn test_logging_sink_clamps_select() {
        let sink = LoggingSink::new(Arc::new(OutOfRange));
        let options = vec!["a".to_string(), "b".to_string()];
        assert_eq!(sink.select("pick", &options, 1), 1);
    }

    #[test]
    fn test_recording_sink_answers_defaults() {
        let sink = RecordingSink::new();
        assert!(sink.confirm("Add user?", true));
        assert_eq!(sink.input("Name", "strix"), "strix");
        sink.log(LogLevel::Warn, "careful");
        assert_eq!(
            sink.events(),
            vec!["confirm:Add user?", "input:Name", "log:warn:careful"]
        );
    }
}
