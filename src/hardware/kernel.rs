//! Running kernel release detection and version parsing.

use crate::error::{HardwareError, InstallError};
use crate::system::{CommandRequest, Host};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static LEADING_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)").expect("static regex"));

/// Leading `major.minor` pair of a kernel release string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        KernelVersion { major, minor }
    }

    /// Extract the leading `(major, minor)` pair. Strings without one parse to `0.0`.
    pub fn parse(release: &str) -> Self {
        match LEADING_VERSION.captures(release) {
            Some(caps) => {
                let major = caps[1].parse().unwrap_or(0);
                let minor = caps[2].parse().unwrap_or(0);
                KernelVersion { major, minor }
            }
            None => KernelVersion::default(),
        }
    }

    pub fn at_least(&self, minimum: KernelVersion) -> bool {
        *self >= minimum
    }
}

impl Default for KernelVersion {
    fn default() -> Self {
        KernelVersion::new(0, 0)
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Query the running kernel release via `uname -r`.
pub async fn detect_kernel_release(host: &Host) -> Result<String, InstallError> {
    let output = host.exec(CommandRequest::query("uname", ["-r"])).await?;
    let release = output.stdout.trim().to_string();
    if release.is_empty() {
        return Err(HardwareError::KernelReleaseUnavailable("uname -r printed nothing".to_string()).into());
    }
    Ok(release)
}
