//! Firmware (DMI) identity strings.

use crate::system::Host;
use serde::{Deserialize, Serialize};

pub const SYS_VENDOR_PATH: &str = "/sys/class/dmi/id/sys_vendor";
pub const PRODUCT_NAME_PATH: &str = "/sys/class/dmi/id/product_name";

/// Manufacturer and product as reported by firmware, whitespace-trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmiIdentity {
    pub manufacturer: String,
    pub product: String,
}

impl DmiIdentity {
    pub fn new(manufacturer: impl Into<String>, product: impl Into<String>) -> Self {
        DmiIdentity {
            manufacturer: manufacturer.into(),
            product: product.into(),
        }
    }
}

/// Read both identity files. A missing or unreadable file yields an empty field.
pub fn read_dmi_identity(host: &Host) -> DmiIdentity {
    DmiIdentity {
        manufacturer: read_field(host, SYS_VENDOR_PATH),
        product: read_field(host, PRODUCT_NAME_PATH),
    }
}

fn read_field(host: &Host, path: &str) -> String {
    match host.read_to_string(path) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            log::debug!("[Hardware] {} unreadable: {}", path, e);
            String::new()
        }
    }
}
