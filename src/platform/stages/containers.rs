//! LXD container runtime setup.

use crate::error::InstallError;
use crate::orchestrator::{Stage, StageContext};
use crate::system::{resolve_target_user, Lxd, Pacman, Systemctl};
use futures::future::BoxFuture;

const LXD_PACKAGE: &str = "lxd";
const LXD_SOCKET: &str = "lxd.socket";

/// Installs and initialises LXD, grants the target user access, and exposes
/// the iGPU to containers through the default profile.
#[derive(Default)]
pub struct ContainerStage;

impl ContainerStage {
    pub fn new() -> Self {
        ContainerStage
    }

    async fn ensure_installed(&self, ctx: &StageContext) -> Result<(), InstallError> {
        ctx.progress(10, "Checking LXD installation...");
        if Pacman::is_installed(&ctx.host, LXD_PACKAGE).await? {
            ctx.info("LXD already installed");
        } else {
            ctx.info("Installing LXD...");
            Pacman::install(&ctx.host, &[LXD_PACKAGE]).await?;
            ctx.info("LXD installed");
        }
        Systemctl::enable_now(&ctx.host, LXD_SOCKET).await
    }

    async fn ensure_initialized(&self, ctx: &StageContext) -> Result<(), InstallError> {
        ctx.progress(30, "Initialising LXD...");
        // lxc may not be on PATH yet in a dry run; treat that as uninitialised.
        let initialized = match Lxd::is_initialized(&ctx.host).await {
            Ok(b) => b,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                log::debug!("[Containers] LXD state query failed: {}", e);
                false
            }
        };
        if initialized {
            ctx.info("LXD already initialised");
            return Ok(());
        }
        Lxd::init(&ctx.host).await?;
        ctx.info("LXD initialised with default storage and network");
        Ok(())
    }

    async fn grant_user_access(&self, ctx: &StageContext) -> Result<(), InstallError> {
        ctx.progress(50, "Configuring LXD group membership...");
        let user = match resolve_target_user(&ctx.settings.target_user) {
            Some(u) => u,
            None => {
                ctx.warn("Could not determine which user to add to the lxd group; skipping");
                return Ok(());
            }
        };

        let in_group = match Lxd::is_user_in_group(&ctx.host, &user).await {
            Ok(b) => b,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(_) => false,
        };
        if in_group {
            ctx.info(format!("{} is already in the lxd group", user));
            return Ok(());
        }

        let question = format!(
            "Add user '{}' to the lxd group? This grants root-equivalent access to containers.",
            user
        );
        if !ctx.ui.confirm(&question, true) {
            ctx.warn(format!("Left {} out of the lxd group; lxc will need root", user));
            return Ok(());
        }
        Lxd::add_user_to_group(&ctx.host, &user).await?;
        ctx.info(format!("Added {} to the lxd group (log out and back in to apply)", user));
        Ok(())
    }
}

impl Stage for ContainerStage {
    fn id(&self) -> &str {
        "containers"
    }

    fn name(&self) -> &str {
        "Container Runtime"
    }

    fn description(&self) -> &str {
        "Install and initialise LXD with GPU passthrough"
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(async move {
            self.ensure_installed(ctx).await?;
            self.ensure_initialized(ctx).await?;
            self.grant_user_access(ctx).await?;

            ctx.progress(70, "Enabling container nesting...");
            Lxd::enable_nesting(&ctx.host).await?;

            let gid = ctx.settings.container_gpu_gid;
            ctx.progress(85, format!("Adding GPU device to default profile (gid={})...", gid));
            Lxd::add_gpu_device(&ctx.host, gid).await?;

            ctx.progress(100, "Container runtime ready");
            Ok(())
        })
    }
}
