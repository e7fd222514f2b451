//! The engine's narration reaches the persisted transcript through the global logger.
//!
//! Kept alone in its own test binary because the `log` backend can only be
//! installed once per process.

mod common;

use common::Fixture;
use std::fs;
use std::sync::Arc;
use strixforge::platform::KernelStage;
use strixforge::ui::RecordingSink;
use strixforge::{CancelSignal, Engine, InstallerSettings, LogCollector};

#[tokio::test]
async fn test_engine_run_is_transcribed() {
    let logs = tempfile::tempdir().unwrap();
    let collector = LogCollector::new(logs.path().to_path_buf()).unwrap();
    collector.install().unwrap();
    let session = collector.start_new_session("install-test").unwrap();

    let fx = Fixture::new();
    fx.with_kernel("6.12.1-arch1-1");
    let sink = Arc::new(RecordingSink::new());
    let engine = Engine::new(
        vec![Box::new(KernelStage::new())],
        fx.host(),
        sink,
        None,
        InstallerSettings::default(),
    );
    assert!(engine.run(CancelSignal::never()).await.is_err());
    collector.wait_for_empty().unwrap();

    let full = fs::read_to_string(&session).unwrap();
    assert!(full.contains("[Progress]  10% Checking kernel version..."));
    assert!(full.contains("Kernel version: 6.12.1-arch1-1 (parsed: 6.12)"));
    assert!(full.contains("[ERROR]"));

    let parsed = fs::read_to_string(logs.path().join("parsed").join("install-test_parsed.log")).unwrap();
    assert!(parsed.contains("[Stage] Starting: Kernel Configuration (kernel)"));
    assert!(parsed.contains("[Stage] Kernel Configuration: failed"));
    assert!(!parsed.contains("[Progress]"));
}
