//! Package manager and service manager wrappers (pacman, yay, systemctl).

use crate::error::InstallError;
use crate::system::exec::CommandRequest;
use crate::system::host::{command_failure, Host};
use once_cell::sync::Lazy;
use regex::Regex;

/// Package names are passed as separate arguments, never interpolated, but
/// are still validated before reaching any command line.
static PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9@._+\-]+$").expect("static regex"));

pub fn validate_package_name(name: &str) -> Result<(), InstallError> {
    if PACKAGE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(InstallError::Command {
            cmd: format!("install {}", name),
            reason: "package name contains invalid characters".to_string(),
        })
    }
}

/// Official repository packages via pacman.
pub struct Pacman;

impl Pacman {
    /// `pacman -Q <pkg>` exits 0 only when the package is installed.
    pub async fn is_installed(host: &Host, package: &str) -> Result<bool, InstallError> {
        validate_package_name(package)?;
        let output = host
            .exec_raw(CommandRequest::query("pacman", ["-Q", package]))
            .await?;
        Ok(output.success())
    }

    pub async fn install(host: &Host, packages: &[&str]) -> Result<(), InstallError> {
        for p in packages {
            validate_package_name(p)?;
        }
        let mut args = vec!["-S", "--needed", "--noconfirm"];
        args.extend_from_slice(packages);
        host.exec(CommandRequest::sudo("pacman", args)).await?;
        Ok(())
    }
}

/// AUR packages via yay. Runs as the invoking user; yay escalates itself.
pub struct Yay;

impl Yay {
    pub async fn install(host: &Host, package: &str) -> Result<(), InstallError> {
        validate_package_name(package)?;
        if !host.has_command("yay") {
            return Err(InstallError::Command {
                cmd: format!("yay -S {}", package),
                reason: "yay is not installed".to_string(),
            });
        }
        host.exec(CommandRequest::mutate(
            "yay",
            ["-S", "--needed", "--noconfirm", package],
        ))
        .await?;
        Ok(())
    }
}

/// systemd unit control.
pub struct Systemctl;

impl Systemctl {
    /// Disable and stop a unit.
    ///
    /// Returns `Ok(false)` when the unit does not exist, which callers treat as
    /// nothing to do rather than a failure.
    pub async fn disable_now(host: &Host, unit: &str) -> Result<bool, InstallError> {
        let request = CommandRequest::sudo("systemctl", ["disable", "--now", unit]);
        let output = host.exec_raw(request.clone()).await?;
        if output.success() {
            return Ok(true);
        }
        let stderr = output.stderr.to_lowercase();
        if stderr.contains("not found") || stderr.contains("does not exist") {
            return Ok(false);
        }
        Err(command_failure(&request, &output))
    }

    pub async fn enable_now(host: &Host, unit: &str) -> Result<(), InstallError> {
        host.exec(CommandRequest::sudo("systemctl", ["enable", "--now", unit]))
            .await?;
        Ok(())
    }
}
