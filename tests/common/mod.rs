//! Shared fixtures: a scratch filesystem root plus a recording command runner.
#![allow(dead_code)]

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use strixforge::system::{CancelSignal, CommandOutput, CommandRequest, CommandRunner, Host};
use strixforge::InstallError;
use tempfile::TempDir;

/// In-process `CommandRunner` double.
///
/// Every request is recorded by its display string. `cp` really copies, so
/// backups and file installs land in the scratch root. Canned stdout and
/// failures are matched by display-string prefix.
#[derive(Default)]
pub struct MockRunner {
    seen: Mutex<Vec<String>>,
    commands: Mutex<HashSet<String>>,
    responses: Mutex<Vec<(String, String)>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(&self, program: &str) -> &Self {
        self.commands.lock().unwrap().insert(program.to_string());
        self
    }

    pub fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), stdout.to_string()));
        self
    }

    /// Any command whose display starts with `prefix` exits 1 with `stderr`.
    pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.failures
            .lock()
            .unwrap()
            .push((prefix.to_string(), stderr.to_string()));
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.seen().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn execute(&self, request: &CommandRequest) -> CommandOutput {
        let display = request.display();
        if let Some((_, stderr)) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| display.starts_with(p.as_str()))
        {
            return CommandOutput {
                stdout: String::new(),
                stderr: stderr.clone(),
                exit_code: 1,
            };
        }
        if request.program == "cp" && request.args.len() == 2 {
            return match fs::copy(&request.args[0], &request.args[1]) {
                Ok(_) => CommandOutput::default(),
                Err(e) => CommandOutput {
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exit_code: 1,
                },
            };
        }
        let stdout = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| display.starts_with(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        CommandOutput {
            stdout,
            ..Default::default()
        }
    }
}

impl CommandRunner for MockRunner {
    fn run_raw<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<CommandOutput, InstallError>> {
        Box::pin(async move {
            cancel.check()?;
            self.seen.lock().unwrap().push(request.display());
            Ok(self.execute(request))
        })
    }

    fn has_command(&self, program: &str) -> bool {
        self.commands.lock().unwrap().contains(program)
    }
}

/// A scratch directory standing in for `/`.
pub struct Fixture {
    pub dir: TempDir,
    pub runner: Arc<MockRunner>,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            runner: Arc::new(MockRunner::new()),
        }
    }

    pub fn host(&self) -> Host {
        Host::new(self.dir.path(), self.runner.clone(), CancelSignal::never())
    }

    pub fn path(&self, host_path: &str) -> PathBuf {
        self.dir.path().join(host_path.trim_start_matches('/'))
    }

    pub fn write(&self, host_path: &str, contents: &str) -> &Self {
        let p = self.path(host_path);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, contents).unwrap();
        self
    }

    pub fn mkdir(&self, host_path: &str) -> &Self {
        fs::create_dir_all(self.path(host_path)).unwrap();
        self
    }

    pub fn read(&self, host_path: &str) -> String {
        fs::read_to_string(self.path(host_path)).unwrap()
    }

    /// Files in the directory of `host_path` whose name starts with its file name plus `.backup-`.
    pub fn backups_of(&self, host_path: &str) -> Vec<PathBuf> {
        let target = self.path(host_path);
        let dir = target.parent().unwrap();
        let prefix = format!(
            "{}.backup-",
            target.file_name().unwrap().to_string_lossy()
        );
        let mut found: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        found
    }

    /// A GRUB install with the stock Arch command line.
    pub fn with_grub(&self) -> &Self {
        self.write(
            "/etc/default/grub",
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"\n",
        )
        .mkdir("/boot/grub")
    }

    /// A rEFInd install with two boot entries.
    pub fn with_refind(&self) -> &Self {
        self.write(
            "/boot/refind_linux.conf",
            "\"Boot with standard options\"  \"rw root=UUID=abcd\"\n\"Boot to single-user mode\"  \"rw root=UUID=abcd single\"\n",
        )
    }

    /// A Limine install with its mkinitcpio hook and a commented default entry.
    pub fn with_limine(&self) -> &Self {
        self.runner.with_command("limine-mkinitcpio");
        self.write(
            "/etc/default/limine",
            "TIMEOUT=5\n#KERNEL_CMDLINE[default]+=\"quiet splash\"\n",
        )
        .mkdir("/boot/limine")
    }

    pub fn with_kernel(&self, release: &str) -> &Self {
        self.runner.respond("uname -r", &format!("{}\n", release));
        self
    }

    pub fn with_ram_gb(&self, gb: u64) -> &Self {
        let kb = gb * 1024 * 1024;
        self.write(
            "/proc/meminfo",
            &format!("MemTotal:       {} kB\nMemFree:        1024 kB\n", kb),
        )
    }

    pub fn with_dmi(&self, vendor: &str, product: &str) -> &Self {
        self.write("/sys/class/dmi/id/sys_vendor", &format!("{}\n", vendor))
            .write("/sys/class/dmi/id/product_name", &format!("{}\n", product))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
