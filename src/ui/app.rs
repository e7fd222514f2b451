//! Native window front end (eframe/egui).
//!
//! The window owns the receiving end of a [`ChannelSink`]; the engine runs on
//! its own thread once the operator presses Start.

use eframe::egui;
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::models::{LogLevel, StageInfo, StageResult, StageStatus};
use crate::orchestrator::Engine;
use crate::ui::channel::{
    spawn_engine, ChannelSink, InstallEvent, PromptAnswer, PromptKind, PromptReply, PromptRequest,
};

const MAX_LOG_LINES: usize = 5000;

/// Transient window state rebuilt from events every frame.
pub struct UIState {
    pub needs_repaint: bool,
    pub last_repaint_time: Instant,
    pub stages: Vec<StageInfo>,
    pub results: Vec<StageResult>,
    pub current_stage: Option<String>,
    pub progress: u8,
    pub status: String,
    pub log: VecDeque<(LogLevel, String)>,
    pub running: bool,
    pub finished: Option<bool>,
    pub error_message: Option<String>,
    /// Prompt awaiting an answer, with the text field's working value.
    pub prompt: Option<(PromptRequest, String)>,
}

impl UIState {
    fn new(stages: Vec<StageInfo>) -> Self {
        UIState {
            needs_repaint: true,
            last_repaint_time: Instant::now(),
            stages,
            results: Vec::new(),
            current_stage: None,
            progress: 0,
            status: "Ready".to_string(),
            log: VecDeque::with_capacity(256),
            running: false,
            finished: None,
            error_message: None,
            prompt: None,
        }
    }

    fn push_log(&mut self, level: LogLevel, line: String) {
        self.log.push_back((level, line));
        while self.log.len() > MAX_LOG_LINES {
            self.log.pop_front();
        }
    }

    fn status_of(&self, id: &str) -> Option<StageStatus> {
        self.results.iter().find(|r| r.stage_id == id).map(|r| r.status)
    }
}

pub struct InstallerApp {
    engine: Option<Engine>,
    sink: Arc<ChannelSink>,
    events: mpsc::UnboundedReceiver<InstallEvent>,
    answers: crossbeam_channel::Sender<PromptAnswer>,
    title: String,
    dry_run: bool,
    ui_state: UIState,
}

impl InstallerApp {
    pub fn new(
        engine: Engine,
        sink: Arc<ChannelSink>,
        events: mpsc::UnboundedReceiver<InstallEvent>,
        answers: crossbeam_channel::Sender<PromptAnswer>,
    ) -> Self {
        let title = match engine.device() {
            Some(d) => format!("Strixforge: {}", d.name()),
            None => "Strixforge: unrecognised device".to_string(),
        };
        let dry_run = engine.is_dry_run();
        let ui_state = UIState::new(engine.stage_infos());
        InstallerApp {
            engine: Some(engine),
            sink,
            events,
            answers,
            title,
            dry_run,
            ui_state,
        }
    }

    fn start(&mut self) {
        if let Some(engine) = self.engine.take() {
            log::info!("[UI] Starting installation");
            self.ui_state.running = true;
            self.ui_state.status = "Starting...".to_string();
            spawn_engine(engine, self.sink.clone());
        }
    }

    fn cancel(&mut self) {
        log::info!("[UI] Cancellation requested");
        self.sink.cancel();
        self.ui_state.status = "Cancelling...".to_string();
    }

    fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let state = &mut self.ui_state;
            match event {
                InstallEvent::StageStart(info) => {
                    state.current_stage = Some(info.id.clone());
                    state.progress = 0;
                    state.push_log(LogLevel::Info, format!("== {} ==", info.name));
                }
                InstallEvent::StageComplete(result) => {
                    if state.current_stage.as_deref() == Some(result.stage_id.as_str()) {
                        state.current_stage = None;
                    }
                    state.results.push(result);
                }
                InstallEvent::Progress { percent, message } => {
                    state.progress = percent;
                    state.status = message;
                }
                InstallEvent::Log { level, message } => state.push_log(level, message),
                InstallEvent::Prompt(request) => {
                    let text = match &request.kind {
                        PromptKind::Input { default, .. } => default.clone(),
                        _ => String::new(),
                    };
                    state.prompt = Some((request, text));
                }
                InstallEvent::Finished { success, error, .. } => {
                    state.running = false;
                    state.finished = Some(success);
                    state.status = if success {
                        "Installation finished".to_string()
                    } else {
                        "Installation failed".to_string()
                    };
                    state.error_message = error;
                }
            }
            self.ui_state.needs_repaint = true;
        }
    }

    fn answer(&mut self, id: u64, reply: PromptReply) {
        if self.answers.send(PromptAnswer { id, reply }).is_err() {
            log::warn!("[UI] Engine no longer waiting for prompt {}", id);
        }
        self.ui_state.prompt = None;
    }

    fn render_top(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_nav").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(&self.title);
                if self.dry_run {
                    ui.separator();
                    ui.colored_label(egui::Color32::from_rgb(255, 200, 80), "DRY RUN");
                }
            });
        });

        if let Some(msg) = self.ui_state.error_message.clone() {
            egui::TopBottomPanel::top("error_panel").show(ctx, |ui| {
                ui.colored_label(egui::Color32::from_rgb(255, 100, 100), format!("Error: {}", msg));
                if ui.button("Dismiss").clicked() {
                    self.ui_state.error_message = None;
                }
            });
        }
    }

    fn render_stages(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("stages").min_width(220.0).show(ctx, |ui| {
            ui.heading("Stages");
            ui.separator();
            for stage in &self.ui_state.stages {
                let (mark, color) = match self.ui_state.status_of(&stage.id) {
                    Some(StageStatus::Success) => ("✔", egui::Color32::from_rgb(100, 255, 100)),
                    Some(StageStatus::Failed) => ("✘", egui::Color32::from_rgb(255, 100, 100)),
                    Some(StageStatus::Skipped) => ("–", egui::Color32::GRAY),
                    None if self.ui_state.current_stage.as_deref() == Some(stage.id.as_str()) => {
                        ("▶", egui::Color32::from_rgb(100, 150, 255))
                    }
                    None => ("·", egui::Color32::GRAY),
                };
                ui.horizontal(|ui| {
                    ui.colored_label(color, mark);
                    let label = if stage.optional {
                        format!("{} (optional)", stage.name)
                    } else {
                        stage.name.clone()
                    };
                    ui.label(label).on_hover_text(&stage.description);
                });
            }
            ui.add_space(12.0);
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(self.engine.is_some(), egui::Button::new("Start"))
                    .clicked()
                {
                    self.start();
                }
                if ui
                    .add_enabled(self.ui_state.running, egui::Button::new("Cancel"))
                    .clicked()
                {
                    self.cancel();
                }
            });
        });
    }

    fn render_progress(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(&self.ui_state.status);
            ui.add(
                egui::ProgressBar::new(self.ui_state.progress as f32 / 100.0).show_percentage(),
            );
            ui.separator();
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for (level, line) in &self.ui_state.log {
                        let color = match level {
                            LogLevel::Info => ui.visuals().text_color(),
                            LogLevel::Warn => egui::Color32::from_rgb(255, 200, 80),
                            LogLevel::Error => egui::Color32::from_rgb(255, 100, 100),
                        };
                        ui.colored_label(color, line);
                    }
                });
        });
    }

    fn render_prompt(&mut self, ctx: &egui::Context) {
        let (request, mut text) = match self.ui_state.prompt.clone() {
            Some(p) => p,
            None => return,
        };
        let mut reply = None;
        egui::Window::new("Input required")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(request.kind.message());
                ui.add_space(8.0);
                match &request.kind {
                    PromptKind::Confirm { default, .. } => {
                        ui.horizontal(|ui| {
                            let yes = if *default { "Yes (default)" } else { "Yes" };
                            let no = if *default { "No" } else { "No (default)" };
                            if ui.button(yes).clicked() {
                                reply = Some(PromptReply::Confirm(true));
                            }
                            if ui.button(no).clicked() {
                                reply = Some(PromptReply::Confirm(false));
                            }
                        });
                    }
                    PromptKind::Select { options, .. } => {
                        for (i, option) in options.iter().enumerate() {
                            if ui.button(option).clicked() {
                                reply = Some(PromptReply::Select(i));
                            }
                        }
                    }
                    PromptKind::Input { .. } => {
                        ui.text_edit_singleline(&mut text);
                        if ui.button("OK").clicked() {
                            reply = Some(PromptReply::Input(text.clone()));
                        }
                    }
                }
            });

        match reply {
            Some(r) => self.answer(request.id, r),
            None => self.ui_state.prompt = Some((request, text)),
        }
    }
}

impl eframe::App for InstallerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_events();

        const IDLE_REPAINT_INTERVAL_MS: u64 = 500;
        if self.ui_state.needs_repaint {
            ctx.request_repaint();
            self.ui_state.needs_repaint = false;
            self.ui_state.last_repaint_time = Instant::now();
        } else if self.ui_state.last_repaint_time.elapsed().as_millis() > IDLE_REPAINT_INTERVAL_MS as u128 {
            ctx.request_repaint_after(std::time::Duration::from_millis(IDLE_REPAINT_INTERVAL_MS));
            self.ui_state.last_repaint_time = Instant::now();
        }

        self.render_top(ctx);
        self.render_stages(ctx);
        self.render_progress(ctx);
        self.render_prompt(ctx);
    }
}

/// Open the native window and block until it closes.
///
/// `build_engine` receives the sink the engine must report to. Closing the
/// window during a run cancels it and waits for the engine thread. Returns the
/// run outcome, or `None` when no run was started.
pub fn run_native<F>(build_engine: F) -> Result<Option<bool>, crate::error::AppError>
where
    F: FnOnce(Arc<ChannelSink>) -> Engine,
{
    let repaint: Arc<OnceCell<egui::Context>> = Arc::new(OnceCell::new());
    let repaint_hook = repaint.clone();
    let (sink, events, answers) = ChannelSink::pair();
    let sink = Arc::new(sink.with_notify(move || {
        if let Some(ctx) = repaint_hook.get() {
            ctx.request_repaint();
        }
    }));

    let engine = build_engine(sink.clone());
    let outcome = sink.clone();
    let app = InstallerApp::new(engine, sink, events, answers);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([960.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Strixforge",
        options,
        Box::new(move |cc| {
            let _ = repaint.set(cc.egui_ctx.clone());
            Box::new(app)
        }),
    )
    .map_err(|e| {
        outcome.cancel_and_wait();
        crate::error::AppError::FrontEnd(e.to_string())
    })?;
    Ok(outcome.cancel_and_wait())
}
