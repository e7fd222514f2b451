//! Interactive terminal front end: a progress bar per stage and prompts on stdin.

use crate::models::{LogLevel, StageInfo, StageResult};
use crate::ui::auto::{format_log, format_result};
use crate::ui::UiSink;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use std::sync::Mutex;

const PB_STYLE: &str = "{spinner:.blue} {prefix:.bold} {wide_bar:.cyan/blue} {pos:>3}% {msg}";
const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";
const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|s| s.tick_chars(TICK).progress_chars(PB_CHARS))
});

pub struct TerminalSink {
    term: Term,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalSink {
    pub fn new() -> Self {
        TerminalSink {
            term: Term::stdout(),
            bar: Mutex::new(None),
        }
    }

    fn with_bar<R>(&self, f: impl FnOnce(Option<&ProgressBar>) -> R) -> R {
        match self.bar.lock() {
            Ok(guard) => f(guard.as_ref()),
            Err(_) => f(None),
        }
    }

    /// Print above the progress bar without tearing it.
    fn println(&self, text: String) {
        self.with_bar(|bar| match bar {
            Some(pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(&text);
            }
        });
    }

    /// Hide the bar while reading a line from the operator.
    fn ask(&self, prompt: String) -> Option<String> {
        let read = || {
            let _ = self.term.write_str(&prompt);
            self.term.read_line().ok()
        };
        self.with_bar(|bar| match bar {
            Some(pb) => pb.suspend(read),
            None => read(),
        })
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret a yes/no answer. Empty or unrecognised input keeps the default.
pub fn parse_confirm(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Interpret a 1-based menu choice. Anything invalid keeps the default index.
pub fn parse_select(answer: &str, len: usize, default: usize) -> usize {
    match answer.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= len => n - 1,
        _ => default,
    }
}

impl UiSink for TerminalSink {
    fn stage_start(&self, stage: &StageInfo) {
        let pb = ProgressBar::new(100);
        if let Some(style) = PB_TEMPLATE.as_ref() {
            pb.set_style(style.clone());
        }
        pb.set_prefix(stage.name.clone());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn stage_complete(&self, result: &StageResult) {
        let finished = self.bar.lock().ok().and_then(|mut slot| slot.take());
        if let Some(pb) = finished {
            pb.finish_and_clear();
        }
        let _ = self.term.write_line(&format_result(result));
    }

    fn progress(&self, percent: u8, message: &str) {
        self.with_bar(|bar| {
            if let Some(pb) = bar {
                pb.set_position(percent.min(100) as u64);
                pb.set_message(message.to_string());
            }
        });
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.println(format_log(level, message));
    }

    fn confirm(&self, message: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        match self.ask(format!("{} {} {} ", style("?").cyan().bold(), message, hint)) {
            Some(answer) => parse_confirm(&answer, default),
            None => default,
        }
    }

    fn select(&self, message: &str, options: &[String], default: usize) -> usize {
        let mut menu = format!("{} {}\n", style("?").cyan().bold(), message);
        for (i, option) in options.iter().enumerate() {
            let marker = if i == default { "*" } else { " " };
            menu.push_str(&format!("  {}{}) {}\n", marker, i + 1, option));
        }
        menu.push_str(&format!("Choice [{}]: ", default + 1));
        match self.ask(menu) {
            Some(answer) => parse_select(&answer, options.len(), default),
            None => default,
        }
    }

    fn input(&self, message: &str, default: &str) -> String {
        match self.ask(format!("{} {} [{}]: ", style("?").cyan().bold(), message, default)) {
            Some(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            _ => default.to_string(),
        }
    }
}
