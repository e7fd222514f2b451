//! Command execution: privileged and unprivileged external commands with
//! cancellation, plus the dry-run wrapper that suppresses host mutation.

use crate::error::InstallError;
use futures::future::BoxFuture;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::watch;

/// Whether a command needs root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    User,
    Root,
}

/// How root is obtained when the process is not already root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Already root, run commands directly.
    None,
    Pkexec,
    Sudo,
}

impl Escalation {
    /// Resolve from a settings value, honoring the effective uid.
    pub fn detect(privilege_command: &str) -> Self {
        if nix::unistd::geteuid().is_root() {
            return Escalation::None;
        }
        match privilege_command {
            "sudo" => Escalation::Sudo,
            _ => Escalation::Pkexec,
        }
    }

    fn program(&self) -> Option<&'static str> {
        match self {
            Escalation::None => None,
            Escalation::Pkexec => Some("pkexec"),
            Escalation::Sudo => Some("sudo"),
        }
    }
}

/// One external command invocation.
///
/// `mutates` marks commands that change persisted host state; the dry-run
/// runner suppresses exactly those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub privilege: Privilege,
    pub mutates: bool,
}

impl CommandRequest {
    fn build<I, S>(program: &str, args: I, privilege: Privilege, mutates: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandRequest {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            privilege,
            mutates,
        }
    }

    /// Unprivileged, read-only command (e.g. `uname -r`).
    pub fn query<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(program, args, Privilege::User, false)
    }

    /// Unprivileged command that changes host state (e.g. `lxc profile set`).
    pub fn mutate<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(program, args, Privilege::User, true)
    }

    /// Privileged command. Always treated as mutating.
    pub fn sudo<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(program, args, Privilege::Root, true)
    }

    /// Privileged, shell-interpreted script.
    pub fn shell_sudo(script: &str) -> Self {
        Self::build("sh", ["-c", script], Privilege::Root, true)
    }

    /// Human-readable rendering used in logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stand-in output for suppressed commands.
    pub fn synthetic() -> Self {
        CommandOutput::default()
    }
}

/// Cancellation signal handed to every operation that shells out.
///
/// Wraps the receiving half of a `watch` channel; the front end holds the sender.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked sender/signal pair.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the sender is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }

    /// Early-out helper for loops between commands.
    pub fn check(&self) -> Result<(), InstallError> {
        if self.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Executes external commands.
///
/// `run_raw` only fails when the command could not be run or was cancelled;
/// a non-zero exit is reported through `CommandOutput::exit_code`.
pub trait CommandRunner: Send + Sync {
    fn run_raw<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<CommandOutput, InstallError>>;

    /// Whether `program` resolves on PATH.
    fn has_command(&self, program: &str) -> bool;
}

/// Production runner backed by tokio::process.
pub struct SystemRunner {
    escalation: Escalation,
}

impl SystemRunner {
    pub fn new(escalation: Escalation) -> Self {
        SystemRunner { escalation }
    }

    fn build_command(&self, request: &CommandRequest) -> Command {
        let mut cmd = match (request.privilege, self.escalation.program()) {
            (Privilege::Root, Some(wrapper)) => {
                let mut c = Command::new(wrapper);
                c.arg(&request.program);
                c
            }
            _ => Command::new(&request.program),
        };
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn run_raw<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<CommandOutput, InstallError>> {
        Box::pin(async move {
            cancel.check()?;
            log::info!("[Exec] {}", request.display());

            let mut cmd = self.build_command(request);
            let output = tokio::select! {
                out = cmd.output() => out.map_err(|e| InstallError::Command {
                    cmd: request.display(),
                    reason: e.to_string(),
                })?,
                _ = cancel.cancelled() => {
                    log::warn!("[Exec] Cancelled: {}", request.display());
                    return Err(InstallError::Cancelled);
                }
            };

            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if !stderr.trim().is_empty() {
                log::info!("[{}] stderr: {}", request.program, stderr.trim());
            }

            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: output.status.code().unwrap_or(-1),
            })
        })
    }

    fn has_command(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Wraps another runner and suppresses every mutating command.
///
/// Read-only queries still reach the inner runner so narration reflects the
/// real host.
pub struct DryRunRunner {
    inner: Arc<dyn CommandRunner>,
}

impl DryRunRunner {
    pub fn new(inner: Arc<dyn CommandRunner>) -> Self {
        DryRunRunner { inner }
    }
}

impl CommandRunner for DryRunRunner {
    fn run_raw<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<CommandOutput, InstallError>> {
        if !request.mutates {
            return self.inner.run_raw(request, cancel);
        }
        Box::pin(async move {
            cancel.check()?;
            log::info!("[Exec] [DRY-RUN] would run: {}", request.display());
            Ok(CommandOutput::synthetic())
        })
    }

    fn has_command(&self, program: &str) -> bool {
        self.inner.has_command(program)
    }
}
