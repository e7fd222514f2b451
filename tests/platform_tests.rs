//! Strix Halo stages and device quirks against a scratch root.

mod common;

use common::Fixture;
use std::sync::Arc;
use strixforge::platform::{self, ContainerStage, Device, KernelStage, VerifyStage};
use strixforge::hardware::DmiIdentity;
use strixforge::orchestrator::{Engine, Stage};
use strixforge::ui::RecordingSink;
use strixforge::{CancelSignal, InstallError, InstallerSettings, RunSummary, StageStatus};

const ZRAM_DISABLE: &str = "systemctl disable --now zram-generator@zram0.service";

fn device(vendor: &str, product: &str) -> Device {
    platform::identify(&DmiIdentity::new(vendor, product)).unwrap()
}

async fn run_stage(
    fx: &Fixture,
    stage: Box<dyn Stage>,
    device: Option<Device>,
    settings: InstallerSettings,
) -> (Result<RunSummary, InstallError>, Vec<String>) {
    let sink = Arc::new(RecordingSink::new());
    let engine = Engine::new(vec![stage], fx.host(), sink.clone(), device, settings);
    let outcome = engine.run(CancelSignal::never()).await;
    (outcome, sink.events())
}

async fn run_kernel(fx: &Fixture, device: Option<Device>) -> (Result<RunSummary, InstallError>, Vec<String>) {
    run_stage(fx, Box::new(KernelStage::new()), device, InstallerSettings::default()).await
}

fn position(seen: &[String], needle: &str) -> usize {
    seen.iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("no command containing {}", needle))
}

// ============================================================================
// Kernel stage
// ============================================================================

#[tokio::test]
async fn test_zram_disabled_at_exactly_64_gb() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.0-1-cachyos").with_ram_gb(64);

    let (outcome, _) = run_kernel(&fx, None).await;
    assert!(outcome.is_ok());
    assert_eq!(fx.runner.count(ZRAM_DISABLE), 1);
}

#[tokio::test]
async fn test_zram_kept_at_63_gb() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.0-1-cachyos").with_ram_gb(63);

    let (outcome, events) = run_kernel(&fx, None).await;
    assert!(outcome.is_ok());
    assert_eq!(fx.runner.count("systemctl"), 0);
    assert!(events.iter().any(|e| e.contains("Keeping ZRAM enabled")));
}

#[tokio::test]
async fn test_missing_zram_unit_is_not_a_warning() {
    let fx = Fixture::new();
    fx.with_grub().with_kernel("6.19.1-arch1-1").with_ram_gb(128);
    fx.runner.fail(ZRAM_DISABLE, "Failed to disable unit: Unit file zram-generator@zram0.service does not exist.");

    let (outcome, events) = run_kernel(&fx, None).await;
    assert!(outcome.is_ok());
    assert!(!events.iter().any(|e| e.contains("Completed with")));
}

#[tokio::test]
async fn test_old_kernel_fails_before_touching_bootloaders() {
    let fx = Fixture::new();
    fx.with_grub().with_kernel("6.12.10-arch1-1").with_ram_gb(128);
    let original = fx.read("/etc/default/grub");

    let (outcome, _) = run_kernel(&fx, None).await;
    let err = outcome.unwrap_err();
    assert_eq!(
        err.to_string(),
        "kernel 6.18+ required, found 6.12.10-arch1-1. Please update your kernel"
    );
    assert_eq!(fx.read("/etc/default/grub"), original);
    assert_eq!(fx.runner.seen(), vec!["uname -r"]);
}

#[tokio::test]
async fn test_unparseable_kernel_release_fails_version_check() {
    let fx = Fixture::new();
    fx.with_kernel("custom-build").with_ram_gb(32);

    let (outcome, _) = run_kernel(&fx, None).await;
    assert!(matches!(outcome, Err(InstallError::KernelTooOld { .. })));
}

#[tokio::test]
async fn test_no_bootloader_is_advisory_not_failure() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.2-arch1-1").with_ram_gb(32);

    let (outcome, events) = run_kernel(&fx, None).await;
    let summary = outcome.unwrap();
    assert_eq!(summary.results[0].status, StageStatus::Success);
    assert!(events
        .iter()
        .any(|e| e.starts_with("log:warn:MANUAL ACTION REQUIRED: add 'iommu=pt amd_pstate=active'")));
}

#[tokio::test]
async fn test_both_bootloaders_attempted_when_first_fails() {
    let fx = Fixture::new();
    fx.with_grub()
        .with_refind()
        .with_kernel("6.18.2-arch1-1")
        .with_ram_gb(32);
    fx.runner.fail("grub-mkconfig", "grub-mkconfig: cannot lock /boot");

    let (outcome, events) = run_kernel(&fx, None).await;
    assert!(outcome.is_ok(), "degraded run still completes");

    let refind = fx.read("/boot/refind_linux.conf");
    assert_eq!(refind.matches("iommu=pt amd_pstate=active\"").count(), 2);
    assert_eq!(fx.backups_of("/etc/default/grub").len(), 1);
    assert_eq!(fx.backups_of("/boot/refind_linux.conf").len(), 1);

    let seen = fx.runner.seen();
    assert!(position(&seen, "/etc/default/grub") < position(&seen, "refind_linux.conf"));
    assert!(events.iter().any(|e| e == "log:warn:Completed with 2 warning(s); review the log above"));
}

#[tokio::test]
async fn test_kernel_progress_is_monotonic() {
    let fx = Fixture::new();
    fx.with_grub()
        .with_refind()
        .with_kernel("6.18.2-arch1-1")
        .with_ram_gb(96);

    let (_, events) = run_kernel(&fx, None).await;
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| e.strip_prefix("progress:"))
        .filter_map(|rest| rest.split(':').next())
        .map(|p| p.parse().unwrap())
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn test_unrecognized_device_skips_quirks_only() {
    let fx = Fixture::new();
    fx.with_grub().with_kernel("6.18.2-arch1-1").with_ram_gb(32);
    fx.with_dmi("QEMU", "Standard PC (Q35 + ICH9, 2009)");
    assert!(platform::detect_device(&fx.host()).is_err());

    let (outcome, events) = run_kernel(&fx, None).await;
    assert!(outcome.is_ok());
    assert!(events
        .iter()
        .any(|e| e == "log:info:No recognised device; no device quirks to apply"));
    assert!(fx.read("/etc/default/grub").contains("iommu=pt amd_pstate=active"));
}

#[tokio::test]
async fn test_rollback_restores_kernel_stage_backups() {
    let fx = Fixture::new();
    fx.with_grub().with_kernel("6.18.2-arch1-1").with_ram_gb(32);
    let original = fx.read("/etc/default/grub");
    fx.runner.fail("pacman -Q lxd", "error: package 'lxd' was not found");
    fx.runner.fail("pacman -S", "error: failed to synchronize databases");

    let sink = Arc::new(RecordingSink::new());
    let settings = InstallerSettings {
        rollback_on_failure: true,
        target_user: "alice".to_string(),
        ..Default::default()
    };
    let engine = Engine::new(
        vec![Box::new(KernelStage::new()), Box::new(ContainerStage::new())],
        fx.host(),
        sink.clone(),
        None,
        settings,
    );
    let err = engine.run(CancelSignal::never()).await.unwrap_err();
    assert!(err.to_string().contains("pacman -S --needed --noconfirm lxd"));
    assert_eq!(fx.read("/etc/default/grub"), original);
    assert!(sink.events().iter().any(|e| e == "log:info:Rolling back Kernel Configuration"));
}

// ============================================================================
// Device quirks
// ============================================================================

#[tokio::test]
async fn test_beelink_quirks_are_applied() {
    let fx = Fixture::new();
    fx.with_grub().with_kernel("6.18.2-arch1-1").with_ram_gb(128);
    fx.runner.fail("pacman -Q ryzenadj", "error: package 'ryzenadj' was not found");
    fx.runner.with_command("yay");

    let (outcome, events) = run_kernel(&fx, Some(device("Beelink", "GTR9 Pro"))).await;
    assert!(outcome.is_ok());
    assert!(fx.read("/etc/default/grub").contains("modprobe.blacklist=ice"));
    assert_eq!(fx.runner.count("yay -S --needed --noconfirm ryzenadj"), 1);
    assert!(!events.iter().any(|e| e.contains("Completed with")));
}

#[tokio::test]
async fn test_installed_package_quirk_is_noop() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.2-arch1-1").with_ram_gb(32);
    fx.runner.with_command("yay");

    let (outcome, _) = run_kernel(&fx, Some(device("Beelink", "GTR9 Pro"))).await;
    assert!(outcome.is_ok());
    assert_eq!(fx.runner.count("pacman -Q ryzenadj"), 1);
    assert_eq!(fx.runner.count("yay"), 0);
}

#[tokio::test]
async fn test_failed_quirk_is_a_warning() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.2-arch1-1").with_ram_gb(32);
    fx.runner.fail("pacman -Q ryzenadj", "error: package 'ryzenadj' was not found");

    let (outcome, events) = run_kernel(&fx, Some(device("Beelink", "GTR9 Pro"))).await;
    assert!(outcome.is_ok());
    assert!(events
        .iter()
        .any(|e| e.starts_with("log:warn:Quirk failed: Quirk 'tdp-tool' failed:")));
}

#[tokio::test]
async fn test_advisory_quirk_is_reported_not_executed() {
    let fx = Fixture::new();
    fx.with_kernel("6.18.2-arch1-1").with_ram_gb(32);

    let (outcome, events) = run_kernel(&fx, Some(device("Framework", "Desktop (AMD Ryzen AI Max 300 Series)"))).await;
    assert!(outcome.is_ok());
    assert!(events.iter().any(|e| e.starts_with("log:warn:ADVISORY: Set the iGPU memory")));
    assert_eq!(fx.runner.seen(), vec!["uname -r"]);
}

#[test]
fn test_detect_device_from_dmi_files() {
    let fx = Fixture::new();
    fx.with_dmi("GMKtec", "EVO-X2");
    let d = platform::detect_device(&fx.host()).unwrap();
    assert_eq!(d.name(), "GMKtec EVO-X2");
    assert!(d.quirks().iter().all(|q| !q.is_auto()));
}

// ============================================================================
// Container and verification stages
// ============================================================================

#[tokio::test]
async fn test_container_stage_full_setup() {
    let fx = Fixture::new();
    fx.runner.respond("groups alice", "alice : alice wheel\n");
    let settings = InstallerSettings {
        target_user: "alice".to_string(),
        ..Default::default()
    };

    let (outcome, events) = run_stage(&fx, Box::new(ContainerStage::new()), None, settings).await;
    assert!(outcome.is_ok());
    assert_eq!(
        fx.runner.seen(),
        vec![
            "pacman -Q lxd",
            "systemctl enable --now lxd.socket",
            "lxc storage list --format=csv",
            "lxd init --auto",
            "groups alice",
            "usermod -aG lxd alice",
            "lxc profile set default security.nesting true",
            "lxc profile device add default gpu gpu gid=110",
        ]
    );
    assert!(events.iter().any(|e| e.starts_with("confirm:Add user 'alice' to the lxd group?")));
}

#[tokio::test]
async fn test_container_stage_skips_existing_membership_and_init() {
    let fx = Fixture::new();
    fx.runner
        .respond("groups bob", "bob : bob lxd wheel\n")
        .respond("lxc storage list", "default,dir,,CREATED,1\n")
        .fail("lxc profile device add", "Error: The device already exists");
    let settings = InstallerSettings {
        target_user: "bob".to_string(),
        container_gpu_gid: 44,
        ..Default::default()
    };

    let (outcome, events) = run_stage(&fx, Box::new(ContainerStage::new()), None, settings).await;
    assert!(outcome.is_ok());
    assert_eq!(fx.runner.count("lxd init"), 0);
    assert_eq!(fx.runner.count("usermod"), 0);
    assert_eq!(fx.runner.count("lxc profile device add default gpu gpu gid=44"), 1);
    assert!(!events.iter().any(|e| e.starts_with("confirm:")));
}

#[tokio::test]
async fn test_verify_reports_pending_reboot() {
    let fx = Fixture::new();
    fx.write("/proc/cmdline", "BOOT_IMAGE=/vmlinuz-linux rw iommu=pt\n");
    fx.write(
        "/etc/default/grub",
        "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet iommu=pt amd_pstate=active\"\n",
    )
    .mkdir("/boot/grub");

    let (outcome, events) =
        run_stage(&fx, Box::new(VerifyStage::new()), None, InstallerSettings::default()).await;
    assert!(outcome.is_ok());
    assert!(events.iter().any(|e| e == "log:info:iommu=pt: active"));
    assert!(events
        .iter()
        .any(|e| e == "log:info:amd_pstate=active: configured, active after reboot"));
}

#[tokio::test]
async fn test_verify_failure_is_optional() {
    let fx = Fixture::new();
    fx.write("/proc/cmdline", "BOOT_IMAGE=/vmlinuz-linux rw\n");

    let (outcome, _) =
        run_stage(&fx, Box::new(VerifyStage::new()), None, InstallerSettings::default()).await;
    let summary = outcome.unwrap();
    assert_eq!(summary.results[0].status, StageStatus::Failed);
}
