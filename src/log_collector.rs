//! Persisted installer transcript.
//!
//! Every `log` record is handed to a background OS thread over an unbounded
//! crossbeam channel, so callers on any runtime (or none) never block on disk.
//!
//! ```text
//! log::info!() / log_parsed!()
//!     |
//! [LogCollector] (log::Log impl)
//!     | crossbeam unbounded
//! [writer thread]
//!     |--> <log_dir>/full/<ts>_full.log      (every record)
//!     `--> <log_dir>/parsed/<ts>_parsed.log  (target "parsed" only)
//! ```

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Target used by `log_parsed!` for milestone lines.
pub const PARSED_TARGET: &str = "parsed";

enum LogMessage {
    Line(LogLine),
    /// Flush marker; the writer answers once everything queued before it is on disk.
    Flush(std::sync::mpsc::Sender<()>),
}

#[derive(Clone, Debug, Default)]
struct SessionState {
    name: Option<String>,
    /// Bumped on every new session so the writer drops its cached handles.
    generation: u64,
}

/// A single transcript line.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub parsed: bool,
    /// `HH:MM:SS.mmm` local time.
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Default file name for a transcript started now, e.g. `20261019_142501_full.log`.
pub fn timestamped_log_name(kind: &str) -> String {
    format!("{}_{}.log", Local::now().format("%Y%m%d_%H%M%S"), kind)
}

/// Background writer state, owned by the writer thread.
struct Writer {
    full_dir: PathBuf,
    parsed_dir: PathBuf,
    session: Arc<Mutex<SessionState>>,
    generation: u64,
    full: Option<File>,
    parsed: Option<File>,
}

impl Writer {
    fn open(path: &Path) -> Option<File> {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("[Log] Failed to open {}: {}", path.display(), e);
                None
            }
        }
    }

    fn file_name(&self, kind: &str) -> String {
        let name = self.session.lock().ok().and_then(|s| s.name.clone());
        match name {
            Some(name) => format!("{}_{}.log", name, kind),
            None => timestamped_log_name(kind),
        }
    }

    /// Drop cached handles when a new session has started.
    fn sync_session(&mut self) {
        let current = self.session.lock().map(|s| s.generation).unwrap_or(self.generation);
        if current != self.generation {
            self.full = None;
            self.parsed = None;
            self.generation = current;
        }
    }

    fn write(&mut self, line: &LogLine) {
        self.sync_session();
        let text = line.formatted();

        if self.full.is_none() {
            let path = self.full_dir.join(self.file_name("full"));
            self.full = Self::open(&path);
        }
        if let Some(f) = self.full.as_mut() {
            let _ = f.write_all(text.as_bytes());
        }

        if line.parsed {
            if self.parsed.is_none() {
                let path = self.parsed_dir.join(self.file_name("parsed"));
                self.parsed = Self::open(&path);
            }
            if let Some(f) = self.parsed.as_mut() {
                let _ = f.write_all(text.as_bytes());
            }
        }
    }

    fn flush(&mut self) {
        for f in [self.full.as_mut(), self.parsed.as_mut()].into_iter().flatten() {
            let _ = f.flush();
            let _ = f.sync_data();
        }
    }
}

/// Transcript sink wired in as the global `log` logger.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_dir: PathBuf,
    session: Arc<Mutex<SessionState>>,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the `full/` and `parsed/` directories and start the writer thread.
    pub fn new(log_dir: PathBuf) -> Result<Self, String> {
        let full_dir = log_dir.join("full");
        let parsed_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let (tx, rx) = unbounded::<LogMessage>();
        let session = Arc::new(Mutex::new(SessionState::default()));

        let mut writer = Writer {
            full_dir,
            parsed_dir,
            session: Arc::clone(&session),
            generation: 0,
            full: None,
            parsed: None,
        };

        std::thread::Builder::new()
            .name("strixforge-log".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => writer.write(&line),
                        LogMessage::Flush(done) => {
                            writer.flush();
                            let _ = done.send(());
                        }
                    }
                }
                writer.flush();
            })
            .map_err(|e| format!("Failed to spawn log writer: {}", e))?;

        Ok(LogCollector {
            tx,
            log_dir,
            session,
            level: LevelFilter::Info,
        })
    }

    /// Install this collector as the process-wide `log` backend.
    pub fn install(&self) -> Result<(), String> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self.clone()))
            .map(|()| log::set_max_level(level))
            .map_err(|e| format!("Failed to set global logger: {}", e))
    }

    /// Route subsequent lines to a dedicated pair of files named after `name`.
    ///
    /// Returns the path of the new full transcript.
    pub fn start_new_session(&self, name: &str) -> Result<PathBuf, String> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Failed to lock session state: {}", e))?;
        session.name = Some(name.to_string());
        session.generation = session.generation.wrapping_add(1);
        Ok(self.log_dir.join("full").join(format!("{}_full.log", name)))
    }

    pub fn session_log_path(&self) -> Option<PathBuf> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.name.clone())
            .map(|name| self.log_dir.join("full").join(format!("{}_full.log", name)))
    }

    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Block until every line queued before this call has reached disk.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());
        if record.target() == PARSED_TARGET {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}
