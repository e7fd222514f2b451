use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use console::{style, Term};

use strixforge::bootloader;
use strixforge::config::SettingsManager;
use strixforge::hardware::HostProfile;
use strixforge::log_parsed;
use strixforge::platform::{self, Device};
use strixforge::system::{resolve_target_user, CancelSignal, Escalation, Host, SystemRunner};
use strixforge::ui::web::{self, DeviceView, WebState};
use strixforge::ui::{self, app, AutoSink, ChannelSink, SharedSink, TerminalSink, UiSink};
use strixforge::{Engine, InstallError, InstallerSettings, LogCollector, RunSummary, StageStatus};

/// Post-install configurator for AMD Strix Halo systems.
#[derive(Parser, Debug)]
#[command(name = "strixforge", version, about)]
#[command(group(ArgGroup::new("mode").args(["tui", "gui", "web", "auto"])))]
struct Cli {
    /// Interactive terminal front end (default without a graphical session)
    #[arg(long)]
    tui: bool,

    /// Native window front end (default when DISPLAY or WAYLAND_DISPLAY is set)
    #[arg(long)]
    gui: bool,

    /// Browser front end (JSON API)
    #[arg(long)]
    web: bool,

    /// Unattended: every prompt takes its default answer
    #[arg(long)]
    auto: bool,

    /// Choose which stages to run before starting (terminal only)
    #[arg(long, conflicts_with_all = ["auto", "gui", "web"])]
    manual: bool,

    /// Narrate every step without changing the host
    #[arg(long)]
    dry_run: bool,

    /// Skip a stage by id (repeatable)
    #[arg(long = "skip", value_name = "ID")]
    skip: Vec<String>,

    /// Roll back completed stages if a required stage fails
    #[arg(long)]
    rollback: bool,

    /// Transcript directory
    #[arg(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,

    /// Address for the browser front end
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8765")]
    bind: SocketAddr,

    /// Serve the browser front end without launching a browser
    #[arg(long, requires = "web")]
    no_browser: bool,

    /// Persist the effective settings (after these flags) and exit
    #[arg(long)]
    save_settings: bool,

    /// Print the stage list and exit
    #[arg(long)]
    list_stages: bool,

    /// Print the detected device and active bootloaders and exit
    #[arg(long)]
    detect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Tui,
    Gui,
    Web,
    Auto,
}

impl Cli {
    fn mode(&self) -> Mode {
        let graphical = ui::graphical_session(|k| std::env::var(k).ok());
        self.mode_for(graphical, Term::stdout().is_term())
    }

    /// Explicit flags win. Otherwise a graphical session gets the window, a
    /// terminal gets the TUI, and anything else runs unattended.
    fn mode_for(&self, graphical: bool, terminal: bool) -> Mode {
        if self.gui {
            Mode::Gui
        } else if self.web {
            Mode::Web
        } else if self.auto {
            Mode::Auto
        } else if self.tui || self.manual {
            Mode::Tui
        } else if graphical {
            Mode::Gui
        } else if terminal {
            Mode::Tui
        } else {
            Mode::Auto
        }
    }

    /// Flags override the persisted settings for this invocation only.
    fn apply(&self, settings: &mut InstallerSettings) {
        if let Some(dir) = &self.log_dir {
            settings.log_dir = dir.to_string_lossy().to_string();
        }
        for id in &self.skip {
            if !settings.skip_stages.contains(id) {
                settings.skip_stages.push(id.clone());
            }
        }
        if self.rollback {
            settings.rollback_on_failure = true;
        }
    }
}

fn init_logging(settings: &InstallerSettings) -> Option<LogCollector> {
    let log_dir = settings.resolved_log_dir();
    let collector = match LogCollector::new(log_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[Main] WARNING: transcript disabled: {}", e);
            return None;
        }
    };
    if let Err(e) = collector.install() {
        eprintln!("[Main] WARNING: {}", e);
    }
    let session = format!("install-{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    match collector.start_new_session(&session) {
        Ok(path) => log::info!("[Main] Transcript: {}", path.display()),
        Err(e) => eprintln!("[Main] WARNING: {}", e),
    }
    Some(collector)
}

fn detect_device(host: &Host) -> Option<Device> {
    match platform::detect_device(host) {
        Ok(device) => {
            log_parsed!("Detected device: {}", device);
            Some(device)
        }
        Err(e) => {
            log::warn!("[Main] {}; device-specific steps will be skipped", e);
            None
        }
    }
}

async fn print_detection(host: &Host, device: Option<&Device>) {
    let profile = HostProfile::detect(host).await;
    println!("{}", style("Host").bold());
    println!("  Kernel:       {}", profile.kernel_release);
    println!("  Memory:       {} GB", profile.ram_gb);
    println!("  CPU:          {}", profile.cpu_model);
    println!("  Vendor:       {}", profile.dmi.manufacturer);
    println!("  Product:      {}", profile.dmi.product);
    println!("  Firmware:     {}", if profile.efi { "UEFI" } else { "BIOS" });
    if !profile.is_strix_halo() {
        println!("  {}", style("CPU is not a Strix Halo part").yellow());
    }

    println!("{}", style("Device").bold());
    match device {
        Some(d) => {
            println!("  {}", d);
            for quirk in d.quirks() {
                let kind = if quirk.is_auto() { "auto" } else { "advisory" };
                println!("    [{}] {}: {}", kind, quirk.id, quirk.description);
            }
        }
        None => println!("  unrecognised (known: {})", platform::known_devices().join(", ")),
    }

    println!("{}", style("Bootloaders").bold());
    let active = bootloader::detect(host);
    if active.is_empty() {
        println!("  none detected");
    }
    for b in active {
        println!("  {} ({})", b, b.config_path());
    }
}

/// Ask about every stage up front; declined ones join the skip set.
fn choose_stages(engine: &Engine) -> Vec<String> {
    let prompt = TerminalSink::new();
    engine
        .stage_infos()
        .into_iter()
        .filter(|info| {
            let label = format!("Run '{}' ({})?", info.name, info.description);
            !prompt.confirm(&label, true)
        })
        .map(|info| info.id)
        .collect()
}

fn build_engine(
    host: &Host,
    ui: SharedSink,
    device: Option<Device>,
    settings: &InstallerSettings,
    cli: &Cli,
) -> Engine {
    let mut engine = Engine::new(
        platform::strix_halo_stages(),
        host.clone(),
        ui,
        device,
        settings.clone(),
    );
    engine.set_dry_run(cli.dry_run);
    if cli.manual {
        let declined = choose_stages(&engine);
        engine.set_skipped(settings.skip_stages.iter().cloned().chain(declined));
    }
    engine
}

fn report(outcome: &Result<RunSummary, InstallError>) -> bool {
    match outcome {
        Ok(summary) => {
            let failed = summary.count(StageStatus::Failed);
            log_parsed!(
                "Finished: {} succeeded, {} failed, {} skipped{}",
                summary.count(StageStatus::Success),
                failed,
                summary.count(StageStatus::Skipped),
                if summary.dry_run { " (dry run)" } else { "" }
            );
            true
        }
        Err(e) => {
            log::error!("[Main] Installation failed: {}", e);
            eprintln!("{} {}", style("error:").red().bold(), e);
            false
        }
    }
}

/// Run in the current runtime, cancelling on Ctrl-C.
async fn run_local(engine: Engine) -> Result<RunSummary, InstallError> {
    let (cancel_tx, cancel) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[Main] Interrupted; cancelling");
            let _ = cancel_tx.send(true);
        }
    });
    engine.run(cancel).await
}

#[tokio::main]
async fn main() -> strixforge::Result<()> {
    let cli = Cli::parse();

    let (mut settings, load_warning) = SettingsManager::load();
    cli.apply(&mut settings);
    let collector = init_logging(&settings);
    log::info!("[Main] strixforge {} starting", strixforge::VERSION);
    if let Some(warning) = load_warning {
        log::warn!("[Config] {}", warning);
    }

    if cli.save_settings {
        let path = SettingsManager::save(&settings)?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    if resolve_target_user(&settings.target_user).is_none() {
        log::warn!("[Main] No target user resolved; group membership will be skipped");
    }

    let runner = Arc::new(SystemRunner::new(Escalation::detect(&settings.privilege_command)));
    let host = Host::system(runner, CancelSignal::never());
    let device = detect_device(&host);

    if cli.detect {
        print_detection(&host, device.as_ref()).await;
        return Ok(());
    }
    if cli.list_stages {
        for stage in platform::strix_halo_stages() {
            let info = stage.info();
            let tag = if info.optional { " (optional)" } else { "" };
            println!("{:<12} {}{}: {}", info.id, info.name, tag, info.description);
        }
        return Ok(());
    }

    let mode = cli.mode();
    log::info!("[Main] Front end: {:?}", mode);
    let success = match mode {
        Mode::Tui | Mode::Auto => {
            let ui: SharedSink = if mode == Mode::Tui {
                Arc::new(TerminalSink::new())
            } else {
                Arc::new(AutoSink::new())
            };
            let engine = build_engine(&host, ui, device, &settings, &cli);
            report(&run_local(engine).await)
        }
        Mode::Gui => {
            let result = app::run_native(|sink: Arc<ChannelSink>| {
                build_engine(&host, sink, device, &settings, &cli)
            });
            match result {
                Ok(outcome) => outcome.unwrap_or(true),
                Err(e) => {
                    eprintln!("{} {}", style("error:").red().bold(), e.user_message());
                    false
                }
            }
        }
        Mode::Web => {
            let (sink, events, answers) = ChannelSink::pair();
            let sink = Arc::new(sink);
            let view = DeviceView {
                device: device.as_ref().map(|d| d.name().to_string()),
                quirks: device.as_ref().map(|d| d.quirks().to_vec()).unwrap_or_default(),
                profile: HostProfile::detect(&host).await,
                bootloaders: bootloader::detect(&host).iter().map(|b| b.name().to_string()).collect(),
            };
            let engine = build_engine(&host, sink.clone(), device, &settings, &cli);
            let state = WebState::new(engine, sink, events, answers, view);
            let browser = if cli.no_browser { None } else { Some(&host) };
            match web::serve(cli.bind, state, browser).await {
                Ok(outcome) => outcome.unwrap_or(true),
                Err(e) => {
                    eprintln!("{} {}", style("error:").red().bold(), e.user_message());
                    false
                }
            }
        }
    };

    if let Some(collector) = collector {
        let _ = collector.wait_for_empty();
    }
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
