//! Event-channel sink shared by the native window and the browser front end.
//!
//! Notifications go out as [`InstallEvent`]s on a tokio channel. Prompts are
//! sent the same way and the calling stage blocks on a crossbeam channel until
//! the front end posts a matching [`PromptAnswer`] or the run is cancelled.
//!
//! The sink also owns the run's cancel switch and the engine thread, so a
//! front end that goes away can cancel and join before the process exits.

use crate::error::InstallError;
use crate::models::{LogLevel, RunSummary, StageInfo, StageResult};
use crate::orchestrator::Engine;
use crate::system::CancelSignal;
use crate::ui::UiSink;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How often a blocked prompt re-checks the cancel signal.
const PROMPT_POLL: Duration = Duration::from_millis(100);

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const SUCCEEDED: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptKind {
    Confirm { message: String, default: bool },
    Select { message: String, options: Vec<String>, default: usize },
    Input { message: String, default: String },
}

impl PromptKind {
    pub fn message(&self) -> &str {
        match self {
            PromptKind::Confirm { message, .. }
            | PromptKind::Select { message, .. }
            | PromptKind::Input { message, .. } => message,
        }
    }

    /// The reply used when the front end goes away or answers with the wrong shape.
    pub fn default_reply(&self) -> PromptReply {
        match self {
            PromptKind::Confirm { default, .. } => PromptReply::Confirm(*default),
            PromptKind::Select { default, .. } => PromptReply::Select(*default),
            PromptKind::Input { default, .. } => PromptReply::Input(default.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub id: u64,
    #[serde(flatten)]
    pub kind: PromptKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PromptReply {
    Confirm(bool),
    Select(usize),
    Input(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptAnswer {
    pub id: u64,
    pub reply: PromptReply,
}

/// Everything the pipeline tells a remote front end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InstallEvent {
    StageStart(StageInfo),
    StageComplete(StageResult),
    Progress { percent: u8, message: String },
    Log { level: LogLevel, message: String },
    Prompt(PromptRequest),
    Finished {
        success: bool,
        summary: Option<RunSummary>,
        error: Option<String>,
    },
}

type Notify = Box<dyn Fn() + Send + Sync>;

pub struct ChannelSink {
    events: mpsc::UnboundedSender<InstallEvent>,
    answers: crossbeam_channel::Receiver<PromptAnswer>,
    next_prompt: AtomicU64,
    notify: Option<Notify>,
    /// One of `IDLE`, `RUNNING`, `SUCCEEDED`, `FAILED`.
    outcome: AtomicU8,
    cancel_tx: watch::Sender<bool>,
    cancel: CancelSignal,
    engine: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSink {
    pub fn new(
        events: mpsc::UnboundedSender<InstallEvent>,
        answers: crossbeam_channel::Receiver<PromptAnswer>,
    ) -> Self {
        let (cancel_tx, cancel) = CancelSignal::channel();
        ChannelSink {
            events,
            answers,
            next_prompt: AtomicU64::new(1),
            notify: None,
            outcome: AtomicU8::new(IDLE),
            cancel_tx,
            cancel,
            engine: Mutex::new(None),
        }
    }

    /// A sink plus the two ends a front end holds.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<InstallEvent>,
        crossbeam_channel::Sender<PromptAnswer>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (answers_tx, answers_rx) = crossbeam_channel::unbounded();
        (Self::new(events_tx, answers_rx), events_rx, answers_tx)
    }

    /// Called after every event, e.g. to wake an egui render loop.
    pub fn with_notify(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Box::new(notify));
        self
    }

    pub fn send(&self, event: InstallEvent) {
        if self.events.send(event).is_err() {
            log::debug!("[ChannelSink] Front end closed; event dropped");
        }
        if let Some(notify) = &self.notify {
            notify();
        }
    }

    /// Publish the run outcome.
    pub fn finish(&self, outcome: &Result<RunSummary, InstallError>) {
        let event = match outcome {
            Ok(summary) => InstallEvent::Finished {
                success: true,
                summary: Some(summary.clone()),
                error: None,
            },
            Err(e) => InstallEvent::Finished {
                success: false,
                summary: None,
                error: Some(e.to_string()),
            },
        };
        let code = if outcome.is_ok() { SUCCEEDED } else { FAILED };
        self.outcome.store(code, Ordering::SeqCst);
        self.send(event);
    }

    /// `None` while no run was started. A run that started but never
    /// published an outcome counts as failed.
    pub fn succeeded(&self) -> Option<bool> {
        match self.outcome.load(Ordering::SeqCst) {
            IDLE => None,
            SUCCEEDED => Some(true),
            _ => Some(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) == RUNNING
    }

    /// The signal the engine run is bound to.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Block until the engine thread, if any, has exited.
    pub fn wait(&self) -> Option<bool> {
        let handle = self.engine.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[ChannelSink] Engine thread panicked");
                self.outcome.store(FAILED, Ordering::SeqCst);
            }
        }
        self.succeeded()
    }

    /// Cancel a run still in flight, then join it.
    pub fn cancel_and_wait(&self) -> Option<bool> {
        if self.is_running() {
            log::warn!("[ChannelSink] Front end closing; cancelling the running installation");
            self.cancel();
        }
        self.wait()
    }

    fn ask(&self, kind: PromptKind) -> PromptReply {
        let id = self.next_prompt.fetch_add(1, Ordering::Relaxed);
        let fallback = kind.default_reply();
        self.send(InstallEvent::Prompt(PromptRequest { id, kind }));
        loop {
            match self.answers.recv_timeout(PROMPT_POLL) {
                Ok(answer) if answer.id == id => return answer.reply,
                Ok(stale) => log::debug!("[ChannelSink] Ignoring answer to prompt {}", stale.id),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        log::warn!(
                            "[ChannelSink] Cancelled while prompt {} was open; using default answer",
                            id
                        );
                        return fallback;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    log::warn!("[ChannelSink] Front end gone; using default answer");
                    return fallback;
                }
            }
        }
    }
}

impl UiSink for ChannelSink {
    fn stage_start(&self, stage: &StageInfo) {
        self.send(InstallEvent::StageStart(stage.clone()));
    }

    fn stage_complete(&self, result: &StageResult) {
        self.send(InstallEvent::StageComplete(result.clone()));
    }

    fn progress(&self, percent: u8, message: &str) {
        self.send(InstallEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.send(InstallEvent::Log {
            level,
            message: message.to_string(),
        });
    }

    fn confirm(&self, message: &str, default: bool) -> bool {
        match self.ask(PromptKind::Confirm {
            message: message.to_string(),
            default,
        }) {
            PromptReply::Confirm(answer) => answer,
            _ => default,
        }
    }

    fn select(&self, message: &str, options: &[String], default: usize) -> usize {
        match self.ask(PromptKind::Select {
            message: message.to_string(),
            options: options.to_vec(),
            default,
        }) {
            PromptReply::Select(i) if i < options.len() => i,
            _ => default,
        }
    }

    fn input(&self, message: &str, default: &str) -> String {
        match self.ask(PromptKind::Input {
            message: message.to_string(),
            default: default.to_string(),
        }) {
            PromptReply::Input(text) => text,
            _ => default.to_string(),
        }
    }
}

/// Run the engine on its own thread and runtime so blocking prompts never
/// stall the front end. The outcome is published as `Finished`; the thread is
/// joined through [`ChannelSink::wait`].
///
/// Returns false when a run was already started through this sink.
pub fn spawn_engine(engine: Engine, sink: Arc<ChannelSink>) -> bool {
    if sink
        .outcome
        .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return false;
    }
    let cancel = sink.cancel_signal();
    let worker = sink.clone();
    let handle = std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("[ChannelSink] Could not start engine runtime: {}", e);
                worker.finish(&Err(InstallError::Io(e)));
                return;
            }
        };
        let outcome = rt.block_on(engine.run(cancel));
        worker.finish(&outcome);
    });
    if let Ok(mut slot) = sink.engine.lock() {
        *slot = Some(handle);
    }
    true
}
