//! Browser front end: a small JSON API over the shared event channel.
//!
//! Routes:
//! - `GET  /api/device`  detected device, host profile and active bootloaders
//! - `GET  /api/stages`  stage list
//! - `POST /api/run`     start the installation (once)
//! - `GET  /api/events`  drain events buffered since the last call
//! - `POST /api/answer`  answer the pending prompt
//! - `POST /api/cancel`  cancel the running installation

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::hardware::HostProfile;
use crate::models::StageInfo;
use crate::orchestrator::Engine;
use crate::platform::Quirk;
use crate::system::{CommandRequest, Host};
use crate::ui::channel::{spawn_engine, ChannelSink, InstallEvent, PromptAnswer};

/// Browsers tried in order, with the arguments that open `url` as a bare window.
const BROWSERS: &[(&str, &str)] = &[
    ("google-chrome", "--app="),
    ("google-chrome-stable", "--app="),
    ("chromium", "--app="),
    ("chromium-browser", "--app="),
    ("brave", "--app="),
    ("brave-browser", "--app="),
];

/// Pick the command that opens `url`: an app-mode Chromium family browser,
/// then Firefox, then `xdg-open`.
pub fn browser_command<F>(url: &str, has_command: F) -> Option<CommandRequest>
where
    F: Fn(&str) -> bool,
{
    let chromium = BROWSERS.iter().find(|(program, _)| has_command(*program));
    if let Some((program, flag)) = chromium {
        return Some(CommandRequest::query(program, [format!("{}{}", flag, url)]));
    }
    if has_command("firefox") {
        return Some(CommandRequest::query("firefox", ["--new-window", url]));
    }
    if has_command("xdg-open") {
        return Some(CommandRequest::query("xdg-open", [url]));
    }
    None
}

/// Open `url` in a browser without waiting for it. Returns false when no
/// browser was found.
pub fn open_browser(host: &Host, url: &str) -> bool {
    let request = match browser_command(url, |p| host.has_command(p)) {
        Some(r) => r,
        None => return false,
    };
    log::info!("[Web] Opening {}", request.display());
    let host = host.clone();
    tokio::spawn(async move {
        if let Err(e) = host.exec(request).await {
            log::warn!("[Web] Browser exited with an error: {}", e);
        }
    });
    true
}

/// Device summary served to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub device: Option<String>,
    pub quirks: Vec<Quirk>,
    pub profile: HostProfile,
    pub bootloaders: Vec<String>,
}

#[derive(Clone)]
pub struct WebState {
    engine: Arc<Mutex<Option<Engine>>>,
    sink: Arc<ChannelSink>,
    events: Arc<Mutex<Vec<InstallEvent>>>,
    answers: crossbeam_channel::Sender<PromptAnswer>,
    stages: Arc<Vec<StageInfo>>,
    device: Arc<DeviceView>,
}

impl WebState {
    pub fn new(
        engine: Engine,
        sink: Arc<ChannelSink>,
        events: mpsc::UnboundedReceiver<InstallEvent>,
        answers: crossbeam_channel::Sender<PromptAnswer>,
        device: DeviceView,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(pump_events(events, buffer.clone()));
        WebState {
            stages: Arc::new(engine.stage_infos()),
            engine: Arc::new(Mutex::new(Some(engine))),
            sink,
            events: buffer,
            answers,
            device: Arc::new(device),
        }
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<InstallEvent>,
    buffer: Arc<Mutex<Vec<InstallEvent>>>,
) {
    while let Some(event) = events.recv().await {
        if let Ok(mut buf) = buffer.lock() {
            buf.push(event);
        }
    }
}

#[derive(Serialize)]
struct Message {
    message: String,
}

fn reply(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Message>) {
    (status, Json(Message { message: message.into() }))
}

async fn get_device(State(state): State<WebState>) -> Json<DeviceView> {
    Json((*state.device).clone())
}

async fn get_stages(State(state): State<WebState>) -> Json<Vec<StageInfo>> {
    Json((*state.stages).clone())
}

async fn post_run(State(state): State<WebState>) -> (StatusCode, Json<Message>) {
    let engine = match state.engine.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => return reply(StatusCode::INTERNAL_SERVER_ERROR, "engine state poisoned"),
    };
    match engine {
        Some(engine) => {
            if spawn_engine(engine, state.sink.clone()) {
                log::info!("[Web] Installation started from browser");
                reply(StatusCode::ACCEPTED, "installation started")
            } else {
                reply(StatusCode::CONFLICT, "installation already started")
            }
        }
        _ => reply(StatusCode::CONFLICT, "installation already started"),
    }
}

async fn get_events(State(state): State<WebState>) -> Json<Vec<InstallEvent>> {
    let drained = state
        .events
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();
    Json(drained)
}

async fn post_answer(
    State(state): State<WebState>,
    Json(answer): Json<PromptAnswer>,
) -> (StatusCode, Json<Message>) {
    match state.answers.send(answer) {
        Ok(()) => reply(StatusCode::OK, "answer accepted"),
        Err(_) => reply(StatusCode::GONE, "no prompt is waiting"),
    }
}

async fn post_cancel(State(state): State<WebState>) -> (StatusCode, Json<Message>) {
    if !state.sink.is_running() {
        return reply(StatusCode::CONFLICT, "no installation is running");
    }
    state.sink.cancel();
    reply(StatusCode::ACCEPTED, "cancellation requested")
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/device", get(get_device))
        .route("/api/stages", get(get_stages))
        .route("/api/run", post(post_run))
        .route("/api/events", get(get_events))
        .route("/api/answer", post(post_answer))
        .route("/api/cancel", post(post_cancel))
        .with_state(state)
}

/// Serve the API until Ctrl-C, then cancel and join a run still in flight.
///
/// With `browser`, a browser is launched on the bound address. Returns the run
/// outcome, or `None` when no run was started.
pub async fn serve(
    addr: SocketAddr,
    state: WebState,
    browser: Option<&Host>,
) -> Result<Option<bool>, AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::FrontEnd(format!("cannot bind {}: {}", addr, e)))?;
    let local = listener
        .local_addr()
        .map_err(|e| AppError::FrontEnd(e.to_string()))?;
    let url = format!("http://{}", local);
    log::info!("[Web] Serving on {}", url);
    match browser {
        Some(host) if open_browser(host, &url) => println!("Installer running at: {}", url),
        Some(_) => println!("Could not open a browser. Please navigate to: {}", url),
        None => println!("Strixforge web interface: {}", url),
    }
    println!("Press Ctrl+C to exit");

    let sink = state.sink.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("[Web] Shutting down");
        })
        .await
        .map_err(|e| AppError::FrontEnd(e.to_string()));

    let outcome = tokio::task::spawn_blocking(move || sink.cancel_and_wait())
        .await
        .map_err(|e| AppError::FrontEnd(format!("engine join failed: {}", e)))?;
    served.map(|()| outcome)
}
