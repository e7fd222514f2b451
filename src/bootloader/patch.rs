//! Pure text patches for each bootloader's kernel command-line syntax.
//!
//! Callers check for an already-present parameter before patching; these
//! functions only rewrite.

use crate::error::BootloaderError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const GRUB_CMDLINE_KEY: &str = "GRUB_CMDLINE_LINUX_DEFAULT";
pub const SDBOOT_OPTIONS_KEY: &str = "LINUX_OPTIONS";
pub const LIMINE_CMDLINE_KEY: &str = "KERNEL_CMDLINE";
pub const REFIND_OPTIONS_KEY: &str = "a quoted options string";

static GRUB_CMDLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"GRUB_CMDLINE_LINUX_DEFAULT="([^"]*)""#).expect("static regex"));
static SDBOOT_COMMENTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)#[ \t]*LINUX_OPTIONS=").expect("static regex"));
static SDBOOT_OPEN_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)LINUX_OPTIONS=""#).expect("static regex"));
static SDBOOT_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(#[ \t]*)?LINUX_OPTIONS=").expect("static regex"));
static LIMINE_COMMENTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#[ \t]*KERNEL_CMDLINE").expect("static regex"));
static LIMINE_VALUE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"KERNEL_CMDLINE.*=""#).expect("static regex"));

/// Current value of `GRUB_CMDLINE_LINUX_DEFAULT`.
pub fn grub_cmdline(content: &str) -> Option<&str> {
    GRUB_CMDLINE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Append `param` inside the quoted `GRUB_CMDLINE_LINUX_DEFAULT` value.
pub fn patch_grub(content: &str, param: &str) -> Result<String, BootloaderError> {
    let current = grub_cmdline(content).ok_or_else(|| BootloaderError::DirectiveMissing {
        bootloader: "GRUB".to_string(),
        key: GRUB_CMDLINE_KEY.to_string(),
    })?;
    if current.contains(param) {
        return Ok(content.to_string());
    }
    let value = format!("{} {}", current, param);
    let value = value.trim();
    let replaced = GRUB_CMDLINE.replacen(content, 1, |_: &Captures| {
        format!("{}=\"{}\"", GRUB_CMDLINE_KEY, value)
    });
    Ok(replaced.into_owned())
}

/// Prepend `param` to `LINUX_OPTIONS`, uncommenting the directive first.
///
/// A file without the directive at all gets a new `LINUX_OPTIONS` line. An
/// unquoted value is left alone; the caller sees the text unchanged.
pub fn patch_sdboot(content: &str, param: &str) -> String {
    if !SDBOOT_DIRECTIVE.is_match(content) {
        let mut out = content.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{}=\"{}\"\n", SDBOOT_OPTIONS_KEY, param));
        return out;
    }
    let uncommented = SDBOOT_COMMENTED.replace_all(content, "${1}LINUX_OPTIONS=");
    SDBOOT_OPEN_QUOTE
        .replace_all(&uncommented, |caps: &Captures| {
            format!("{}{}=\"{} ", &caps[1], SDBOOT_OPTIONS_KEY, param)
        })
        .into_owned()
}

/// Insert `param` at the front of every `KERNEL_CMDLINE...="` value.
///
/// Commented directives are enabled first. When no directive exists, a
/// default-entry directive carrying only `param` is appended.
pub fn patch_limine(content: &str, param: &str) -> String {
    let uncommented = LIMINE_COMMENTED.replace_all(content, LIMINE_CMDLINE_KEY);
    let mut touched = false;
    let mut out: Vec<String> = Vec::new();
    for line in uncommented.split_inclusive('\n') {
        if let Some(m) = LIMINE_VALUE_OPEN.find(line) {
            touched = true;
            out.push(format!("{}{} {}", &line[..m.end()], param, &line[m.end()..]));
        } else {
            out.push(line.to_string());
        }
    }
    let mut patched = out.concat();
    if !touched {
        if !patched.is_empty() && !patched.ends_with('\n') {
            patched.push('\n');
        }
        patched.push_str(&format!("{}[default]+=\"{}\"\n", LIMINE_CMDLINE_KEY, param));
    }
    patched
}

/// Append ` param` before the closing quote of every quoted options line.
///
/// Trailing whitespace and CRLF endings are kept as found; comment lines are
/// never touched.
pub fn patch_refind(content: &str, param: &str) -> String {
    content
        .split_inclusive('\n')
        .map(|line| {
            let body = line.trim_end();
            let trailer = &line[body.len()..];
            if body.trim_start().starts_with('#') {
                return line.to_string();
            }
            match body.strip_suffix('"') {
                Some(head) => format!("{} {}\"{}", head, param, trailer),
                None => line.to_string(),
            }
        })
        .collect()
}
