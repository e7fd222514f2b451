//! Engine policy: ordering, optional vs required failure, skip set, dry run,
//! rollback and cancellation, including a run driven through the channel sink.

mod common;

use common::Fixture;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use strixforge::orchestrator::{Engine, RunPhase, Stage, StageContext};
use strixforge::platform::KernelStage;
use strixforge::system::CommandRequest;
use strixforge::ui::channel::{spawn_engine, ChannelSink, InstallEvent};
use strixforge::ui::RecordingSink;
use strixforge::{InstallError, InstallerSettings, StageStatus};

/// Stage double that logs its calls into a shared journal.
struct ScriptedStage {
    id: &'static str,
    optional: bool,
    fail: bool,
    requires_device: bool,
    /// Ask a confirm prompt, then run a command.
    prompt: bool,
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStage {
    fn new(id: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        ScriptedStage {
            id,
            optional: false,
            fail: false,
            requires_device: false,
            prompt: false,
            journal: journal.clone(),
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn device_only(mut self) -> Self {
        self.requires_device = true;
        self
    }

    fn prompting(mut self) -> Self {
        self.prompt = true;
        self
    }
}

impl Stage for ScriptedStage {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "scripted"
    }

    fn optional(&self) -> bool {
        self.optional
    }

    fn requires_device(&self) -> bool {
        self.requires_device
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            self.journal.lock().unwrap().push(format!("run:{}", self.id));
            ctx.progress(50, format!("{} halfway", self.id));
            if self.prompt {
                let answer = ctx.ui.confirm(&format!("Continue {}?", self.id), true);
                self.journal
                    .lock()
                    .unwrap()
                    .push(format!("answer:{}:{}", self.id, answer));
                ctx.host
                    .exec(CommandRequest::query("true", Vec::<String>::new()))
                    .await?;
            }
            if self.fail {
                return Err(InstallError::StageFailed {
                    stage: self.id.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, _ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            self.journal.lock().unwrap().push(format!("rollback:{}", self.id));
            Ok(())
        })
    }
}

fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn engine(fx: &Fixture, stages: Vec<Box<dyn Stage>>, sink: &Arc<RecordingSink>) -> Engine {
    Engine::new(stages, fx.host(), sink.clone(), None, InstallerSettings::default())
}

#[tokio::test]
async fn test_stages_run_in_declaration_order() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j)),
            Box::new(ScriptedStage::new("c", &j)),
        ],
        &sink,
    );

    let summary = e.run(strixforge::CancelSignal::never()).await.unwrap();
    assert_eq!(*j.lock().unwrap(), vec!["run:a", "run:b", "run:c"]);
    assert_eq!(summary.count(StageStatus::Success), 3);
    assert!(!summary.dry_run);

    let events = sink.events();
    assert_eq!(events[0], "start:a");
    assert_eq!(events[1], "progress:50:a halfway");
    assert_eq!(events[2], "complete:a:success");
    assert_eq!(e.state_handle().read().await.phase, RunPhase::Completed);
}

#[tokio::test]
async fn test_optional_failure_does_not_abort() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j).optional().failing()),
            Box::new(ScriptedStage::new("b", &j)),
        ],
        &sink,
    );

    let summary = e.run(strixforge::CancelSignal::never()).await.unwrap();
    assert_eq!(*j.lock().unwrap(), vec!["run:a", "run:b"]);
    assert_eq!(summary.results[0].status, StageStatus::Failed);
    assert_eq!(
        summary.results[0].error.as_deref(),
        Some("Stage 'a' failed: scripted failure")
    );
    assert_eq!(summary.results[1].status, StageStatus::Success);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn test_required_failure_aborts_remaining_stages() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j).failing()),
            Box::new(ScriptedStage::new("c", &j)),
        ],
        &sink,
    );

    let err = e.run(strixforge::CancelSignal::never()).await.unwrap_err();
    assert_eq!(err.to_string(), "Stage 'b' failed: scripted failure");
    assert_eq!(*j.lock().unwrap(), vec!["run:a", "run:b"]);

    let results = e.results().await;
    let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StageStatus::Success, StageStatus::Failed, StageStatus::Skipped]
    );
    assert_eq!(results[2].error.as_deref(), Some("pipeline aborted"));

    let state = e.state_handle();
    let state = state.read().await;
    assert_eq!(state.phase, RunPhase::Failed);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn test_skipped_stage_is_reported_without_running() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let mut e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j)),
        ],
        &sink,
    );
    e.set_skipped(["a", "not-a-stage"]);

    let summary = e.run(strixforge::CancelSignal::never()).await.unwrap();
    assert_eq!(*j.lock().unwrap(), vec!["run:b"]);
    assert_eq!(summary.results[0].status, StageStatus::Skipped);
    assert_eq!(summary.results[0].error.as_deref(), Some("deselected"));

    let events = sink.events();
    assert!(!events.contains(&"start:a".to_string()));
    assert!(events.contains(&"complete:a:skipped".to_string()));
}

#[tokio::test]
async fn test_skip_set_comes_from_settings() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let settings = InstallerSettings {
        skip_stages: vec!["b".to_string()],
        ..Default::default()
    };
    let e = Engine::new(
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j)),
        ],
        fx.host(),
        sink.clone(),
        None,
        settings,
    );

    e.run(strixforge::CancelSignal::never()).await.unwrap();
    assert_eq!(*j.lock().unwrap(), vec!["run:a"]);
}

#[tokio::test]
async fn test_device_only_stage_skipped_without_device() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("quirks", &j).device_only()),
            Box::new(ScriptedStage::new("generic", &j)),
        ],
        &sink,
    );

    let summary = e.run(strixforge::CancelSignal::never()).await.unwrap();
    assert_eq!(*j.lock().unwrap(), vec!["run:generic"]);
    assert_eq!(summary.results[0].status, StageStatus::Skipped);
    assert_eq!(
        summary.results[0].error.as_deref(),
        Some("no supported device detected")
    );
}

#[tokio::test]
async fn test_rollback_runs_in_reverse_when_enabled() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let mut e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j).optional().failing()),
            Box::new(ScriptedStage::new("c", &j)),
            Box::new(ScriptedStage::new("d", &j).failing()),
        ],
        &sink,
    );
    e.set_rollback_on_failure(true);

    assert!(e.run(strixforge::CancelSignal::never()).await.is_err());
    assert_eq!(
        *j.lock().unwrap(),
        vec!["run:a", "run:b", "run:c", "run:d", "rollback:c", "rollback:a"]
    );
}

#[tokio::test]
async fn test_no_rollback_by_default() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j)),
            Box::new(ScriptedStage::new("b", &j).failing()),
        ],
        &sink,
    );

    assert!(e.run(strixforge::CancelSignal::never()).await.is_err());
    assert_eq!(*j.lock().unwrap(), vec!["run:a", "run:b"]);
}

#[tokio::test]
async fn test_cancel_before_start_aborts_even_optional_stages() {
    let fx = Fixture::new();
    let j = journal();
    let sink = Arc::new(RecordingSink::new());
    let e = engine(
        &fx,
        vec![
            Box::new(ScriptedStage::new("a", &j).optional()),
            Box::new(ScriptedStage::new("b", &j)),
        ],
        &sink,
    );
    let (tx, cancel) = strixforge::CancelSignal::channel();
    tx.send(true).unwrap();

    let err = e.run(cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(j.lock().unwrap().is_empty());
    let statuses: Vec<_> = e.results().await.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![StageStatus::Failed, StageStatus::Skipped]);
}

fn ready_host(fx: &Fixture) {
    fx.with_grub().with_kernel("6.18.3-arch1-1").with_ram_gb(128);
}

#[tokio::test]
async fn test_dry_run_mutates_nothing_but_narrates_everything() {
    let live = Fixture::new();
    ready_host(&live);
    let live_sink = Arc::new(RecordingSink::new());
    engine(&live, vec![Box::new(KernelStage::new())], &live_sink)
        .run(strixforge::CancelSignal::never())
        .await
        .unwrap();

    let dry = Fixture::new();
    ready_host(&dry);
    let original = dry.read("/etc/default/grub");
    let dry_sink = Arc::new(RecordingSink::new());
    let mut e = engine(&dry, vec![Box::new(KernelStage::new())], &dry_sink);
    e.set_dry_run(true);
    let summary = e.run(strixforge::CancelSignal::never()).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.results[0].status, StageStatus::Success);
    assert_eq!(dry.read("/etc/default/grub"), original);
    assert!(dry.backups_of("/etc/default/grub").is_empty());
    assert_eq!(dry.runner.seen(), vec!["uname -r"]);

    let progress = |events: Vec<String>| -> Vec<String> {
        events.into_iter().filter(|e| e.starts_with("progress:")).collect()
    };
    assert_eq!(progress(dry_sink.events()), progress(live_sink.events()));
    assert!(live.read("/etc/default/grub").contains("iommu=pt amd_pstate=active"));
}

#[test]
fn test_channel_run_cancelled_at_prompt_is_joined_and_fails() {
    let fx = Fixture::new();
    let j = journal();
    let (sink, mut events, _answers) = ChannelSink::pair();
    let sink = Arc::new(sink);
    let e = Engine::new(
        vec![
            Box::new(ScriptedStage::new("a", &j).prompting()),
            Box::new(ScriptedStage::new("b", &j)),
        ],
        fx.host(),
        sink.clone(),
        None,
        InstallerSettings::default(),
    );
    assert_eq!(sink.succeeded(), None);
    assert!(spawn_engine(e, sink.clone()));

    while !matches!(events.blocking_recv(), Some(InstallEvent::Prompt(_)) | None) {}
    assert!(sink.is_running());

    assert_eq!(sink.cancel_and_wait(), Some(false));
    assert!(!sink.is_running());
    assert_eq!(*j.lock().unwrap(), vec!["run:a", "answer:a:true"]);
    assert_eq!(fx.runner.count("true"), 0, "cancelled before the command ran");

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let InstallEvent::Finished { success, error, .. } = event {
            finished = Some((success, error));
        }
    }
    let (success, error) = finished.expect("Finished event");
    assert!(!success);
    assert_eq!(error.as_deref(), Some("Operation cancelled"));
}
