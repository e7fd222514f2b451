//! CPU identification from /proc/cpuinfo.

use crate::system::Host;

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Detect the CPU model name. Falls back to "Unknown" when unreadable.
pub fn detect_cpu_model(host: &Host) -> String {
    match host.read_to_string(CPUINFO_PATH) {
        Ok(content) => parse_cpu_model(&content),
        Err(e) => {
            log::debug!("[Hardware] {} unreadable: {}", CPUINFO_PATH, e);
            "Unknown".to_string()
        }
    }
}

fn parse_cpu_model(content: &str) -> String {
    content
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split(": ").nth(1))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Strix Halo parts ship as "AMD RYZEN AI MAX" / "MAX+" branded APUs.
pub fn is_strix_halo_cpu(model: &str) -> bool {
    model.to_uppercase().contains("RYZEN AI MAX")
}
