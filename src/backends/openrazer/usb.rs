//! Razer hardware visible on the USB bus, regardless of daemon support.

use std::{collections::BTreeMap, fs, path::Path};

pub const RAZER_VID: u16 = 0x1532;

pub const SYSFS_USB: &str = "/sys/bus/usb/devices";

fn read_hex(path: &Path) -> Option<u16> {
    u16::from_str_radix(fs::read_to_string(path).ok()?.trim(), 16).ok()
}

/// Product id to product name for every Razer device under `root`.
pub fn scan(root: &Path) -> BTreeMap<u16, String> {
    let Ok(entries) = fs::read_dir(root) else {
        return BTreeMap::new();
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|dir| read_hex(&dir.join("idVendor")) == Some(RAZER_VID))
        .filter_map(|dir| {
            let pid = read_hex(&dir.join("idProduct"))?;
            let name = fs::read_to_string(dir.join("product"))
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|_| format!("Razer device {pid:04x}"));
            Some((pid, name))
        })
        .collect()
}
