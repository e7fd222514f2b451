//! System module: command execution, host path resolution, and thin wrappers
//! around package managers, systemd and LXD.

pub mod exec;
pub mod host;
pub mod lxd;
pub mod packages;

pub use exec::{
    CancelSignal, CommandOutput, CommandRequest, CommandRunner, DryRunRunner, Escalation,
    Privilege, SystemRunner,
};
pub use host::Host;
pub use lxd::Lxd;
pub use packages::{Pacman, Systemctl, Yay};

/// Milestone line: lands in both the full and the parsed transcript.
#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::log::info!(target: "parsed", "{}", msg);
    }}
}

/// Resolve the account that should own user-level changes (group membership,
/// AUR builds): an explicit setting, then `$SUDO_USER`, then `$USER`.
pub fn resolve_target_user(configured: &str) -> Option<String> {
    if !configured.trim().is_empty() {
        return Some(configured.trim().to_string());
    }
    ["SUDO_USER", "USER"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty() && v != "root")
}
