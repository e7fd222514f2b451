//! LXD container runtime operations.

use crate::error::InstallError;
use crate::system::exec::CommandRequest;
use crate::system::host::{command_failure, Host};

pub struct Lxd;

impl Lxd {
    /// Initialize LXD with automatic defaults.
    pub async fn init(host: &Host) -> Result<(), InstallError> {
        host.exec(CommandRequest::sudo("lxd", ["init", "--auto"])).await?;
        Ok(())
    }

    /// Whether LXD has already been initialised (a default storage pool exists).
    pub async fn is_initialized(host: &Host) -> Result<bool, InstallError> {
        let output = host
            .exec_raw(CommandRequest::query("lxc", ["storage", "list", "--format=csv"]))
            .await?;
        Ok(output.success() && !output.stdout.trim().is_empty())
    }

    pub async fn add_user_to_group(host: &Host, user: &str) -> Result<(), InstallError> {
        host.exec(CommandRequest::sudo("usermod", ["-aG", "lxd", user])).await?;
        Ok(())
    }

    pub async fn is_user_in_group(host: &Host, user: &str) -> Result<bool, InstallError> {
        let output = host.exec_raw(CommandRequest::query("groups", [user])).await?;
        Ok(output.success() && output.stdout.split_whitespace().any(|g| g == "lxd"))
    }

    pub async fn set_profile_config(host: &Host, key: &str, value: &str) -> Result<(), InstallError> {
        host.exec(CommandRequest::mutate(
            "lxc",
            ["profile", "set", "default", key, value],
        ))
        .await?;
        Ok(())
    }

    /// Enable container nesting (Docker-in-LXD and similar).
    pub async fn enable_nesting(host: &Host) -> Result<(), InstallError> {
        Self::set_profile_config(host, "security.nesting", "true").await
    }

    /// Expose the GPU to the default profile. An existing device is not an error.
    pub async fn add_gpu_device(host: &Host, gid: u32) -> Result<(), InstallError> {
        let gid_arg = format!("gid={}", gid);
        let request = CommandRequest::mutate(
            "lxc",
            ["profile", "device", "add", "default", "gpu", "gpu", gid_arg.as_str()],
        );
        let output = host.exec_raw(request.clone()).await?;
        if output.success() || output.stderr.contains("already exists") {
            Ok(())
        } else {
            Err(command_failure(&request, &output))
        }
    }
}
