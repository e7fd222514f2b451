//! RAM detection from the memory-information pseudo-file.

use crate::error::HardwareError;
use crate::system::Host;

/// Host path of the memory-information pseudo-file.
pub const MEMINFO_PATH: &str = "/proc/meminfo";

/// Detect total system RAM in whole gigabytes (GiB, truncated).
///
/// Reads the `MemTotal` field, which the kernel reports in kilobytes.
pub fn detect_ram_gb(host: &Host) -> Result<u64, HardwareError> {
    let content = host.read_to_string(MEMINFO_PATH).map_err(|e| {
        HardwareError::MemoryInfoUnavailable(format!("{}: {}", MEMINFO_PATH, e))
    })?;
    parse_meminfo_gb(&content)
}

/// Extract `MemTotal` from meminfo content and convert kB to GB.
pub fn parse_meminfo_gb(content: &str) -> Result<u64, HardwareError> {
    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            let value = line.split_whitespace().nth(1).ok_or_else(|| {
                HardwareError::MemoryInfoUnavailable("MemTotal has no value".to_string())
            })?;
            let ram_kb = value.parse::<u64>().map_err(|e| {
                HardwareError::MemoryInfoUnavailable(format!("MemTotal '{}': {}", value, e))
            })?;
            return Ok(ram_kb / 1024 / 1024);
        }
    }
    Err(HardwareError::MemoryInfoUnavailable(format!(
        "MemTotal not found in {}",
        MEMINFO_PATH
    )))
}
