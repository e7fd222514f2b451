//! Host handle: filesystem root, command runner and cancellation bound together.
//!
//! Every host path (`/etc/default/grub`, `/proc/meminfo`, ...) is resolved
//! beneath `root`, which is `/` in production and a scratch directory in tests.

use crate::error::InstallError;
use crate::system::exec::{CancelSignal, CommandOutput, CommandRequest, CommandRunner, DryRunRunner};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct Host {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    cancel: CancelSignal,
}

impl Host {
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>, cancel: CancelSignal) -> Self {
        Host {
            root: root.into(),
            runner,
            cancel,
        }
    }

    /// Host rooted at `/`.
    pub fn system(runner: Arc<dyn CommandRunner>, cancel: CancelSignal) -> Self {
        Self::new("/", runner, cancel)
    }

    /// Same host with every mutating command suppressed.
    pub fn dry_run(&self) -> Host {
        Host {
            root: self.root.clone(),
            runner: Arc::new(DryRunRunner::new(self.runner.clone())),
            cancel: self.cancel.clone(),
        }
    }

    /// Same host bound to a different cancellation signal.
    pub fn with_cancel(&self, cancel: CancelSignal) -> Host {
        Host {
            root: self.root.clone(),
            runner: self.runner.clone(),
            cancel,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Resolve an absolute host path beneath the root.
    pub fn path(&self, host_path: impl AsRef<Path>) -> PathBuf {
        let p = host_path.as_ref();
        let rel = p.strip_prefix("/").unwrap_or(p);
        self.root.join(rel)
    }

    pub fn exists(&self, host_path: impl AsRef<Path>) -> bool {
        self.path(host_path).exists()
    }

    pub fn read_to_string(&self, host_path: impl AsRef<Path>) -> io::Result<String> {
        std::fs::read_to_string(self.path(host_path))
    }

    pub fn has_command(&self, program: &str) -> bool {
        self.runner.has_command(program)
    }

    /// Run a command and hand back its output whatever the exit status.
    pub async fn exec_raw(&self, request: CommandRequest) -> Result<CommandOutput, InstallError> {
        self.runner.run_raw(&request, &self.cancel).await
    }

    /// Run a command, treating any non-zero exit as failure.
    pub async fn exec(&self, request: CommandRequest) -> Result<CommandOutput, InstallError> {
        let output = self.exec_raw(request.clone()).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(command_failure(&request, &output))
        }
    }

    /// Replace a host file's contents through a privileged copy.
    ///
    /// The new contents are staged in a temp file first so the target is never
    /// written by this (possibly unprivileged) process directly.
    pub async fn install_file(&self, host_path: impl AsRef<Path>, contents: &str) -> Result<(), InstallError> {
        let target = self.path(host_path);
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(contents.as_bytes())?;
        staged.flush()?;

        let request = CommandRequest::sudo(
            "cp",
            [
                staged.path().to_string_lossy().to_string(),
                target.to_string_lossy().to_string(),
            ],
        );
        self.exec(request).await?;
        Ok(())
    }
}

/// Build the error for a command that exited non-zero.
pub fn command_failure(request: &CommandRequest, output: &CommandOutput) -> InstallError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    InstallError::Command {
        cmd: request.display(),
        reason: if detail.is_empty() {
            format!("exit status {}", output.exit_code)
        } else {
            format!("exit status {}: {}", output.exit_code, detail)
        },
    }
}
