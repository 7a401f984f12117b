use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::unistd::getuid;
use tracing::{debug, trace};

use crate::core::hardware::{
    DeviceHint, MountCandidate, MountResolver, parse_mount_table, select_mount,
};
use crate::core::models::MountPoint;

const MOUNT_TABLE: &str = "/proc/self/mounts";

/// udev properties copied onto block-device candidates.
const UDEV_PROPERTIES: &[&str] = &[
    "ID_FS_LABEL",
    "ID_VENDOR_ID",
    "ID_MODEL_ID",
    "ID_VENDOR",
    "ID_MODEL",
];

/// Finds the camera in the kernel mount table and under gvfs.
pub struct LinuxMountResolver {
    mount_table: PathBuf,
    uid: u32,
}

impl LinuxMountResolver {
    pub fn with_defaults() -> Self {
        Self {
            mount_table: PathBuf::from(MOUNT_TABLE),
            uid: getuid().as_raw(),
        }
    }

    fn collect_candidates(&self, hint: &DeviceHint) -> Result<Vec<MountCandidate>> {
        let table = fs::read_to_string(&self.mount_table)
            .with_context(|| format!("Failed to read {}", self.mount_table.display()))?;

        let mut candidates = parse_mount_table(&table);
        for candidate in candidates.iter_mut() {
            if candidate.source.starts_with("/dev/") {
                candidate.properties = block_device_properties(&candidate.source);
            }
        }

        for root in hint.expanded_browse_roots(self.uid) {
            candidates.extend(browse_root_children(&root));
        }

        trace!(count = candidates.len(), "Collected mount candidates");
        Ok(candidates)
    }
}

impl MountResolver for LinuxMountResolver {
    fn resolve(&self, hint: &DeviceHint) -> Result<Option<MountPoint>> {
        if hint.require_usb_presence {
            if let Some((vendor, product)) = hint.usb_ids() {
                if !usb_device_present(vendor, product)? {
                    debug!(vendor, product, "Device not on the USB bus");
                    return Ok(None);
                }
            }
        }

        let matcher = hint
            .matcher(self.uid)
            .context("Invalid device label pattern")?;
        let candidates = self.collect_candidates(hint)?;

        Ok(select_mount(&candidates, &matcher))
    }

    fn candidates(&self, hint: &DeviceHint) -> Result<Vec<MountCandidate>> {
        self.collect_candidates(hint)
    }
}

/// Every directory directly below a gvfs-style root is a mounted location.
fn browse_root_children(root: &Path) -> Vec<MountCandidate> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            trace!(root = %root.display(), error = %e, "Browse root not readable");
            return Vec::new();
        }
    };

    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| MountCandidate {
            path: e.path(),
            source: e.file_name().to_string_lossy().into_owned(),
            fstype: "gvfs".to_string(),
            properties: BTreeMap::new(),
        })
        .collect()
}

/// Look up the identifying udev properties of a block device node.
fn block_device_properties(devnode: &str) -> BTreeMap<String, String> {
    let Some(sysname) = Path::new(devnode).file_name() else {
        return BTreeMap::new();
    };

    let sysname = sysname.to_string_lossy().into_owned();
    let device = match udev::Device::from_subsystem_sysname("block".to_string(), sysname) {
        Ok(device) => device,
        Err(e) => {
            trace!(devnode, error = %e, "No udev entry for block device");
            return BTreeMap::new();
        }
    };

    UDEV_PROPERTIES
        .iter()
        .filter_map(|key| {
            device
                .property_value(key)
                .map(|v| (key.to_string(), v.to_string_lossy().into_owned()))
        })
        .collect()
}

/// Whether a USB device with this vendor/product pair is attached.
fn usb_device_present(vendor: &str, product: &str) -> Result<bool> {
    let mut enumerator = udev::Enumerator::new().context("Failed to create udev enumerator")?;
    enumerator.match_subsystem("usb")?;
    enumerator.match_attribute("idVendor", vendor.to_lowercase())?;
    enumerator.match_attribute("idProduct", product.to_lowercase())?;

    let present = enumerator
        .scan_devices()
        .context("Failed to scan USB devices")?
        .next()
        .is_some();

    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_browse_root_children_lists_directories() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("mtp:host=GoPro_HERO12_Black")).unwrap();
        fs::write(temp.path().join("not-a-mount"), b"").unwrap();

        let children = browse_root_children(temp.path());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].source, "mtp:host=GoPro_HERO12_Black");
        assert_eq!(children[0].fstype, "gvfs");
    }

    #[test]
    fn test_browse_root_missing_is_empty() {
        assert!(browse_root_children(Path::new("/nonexistent/gvfs")).is_empty());
    }

    #[test]
    fn test_resolve_from_custom_mount_table() {
        let temp = tempdir().unwrap();
        let table = temp.path().join("mounts");
        fs::write(
            &table,
            "/dev/root / ext4 rw 0 0\n\
             tmpfs /media/me/HERO12\\040BLACK tmpfs rw 0 0\n",
        )
        .unwrap();

        let resolver = LinuxMountResolver {
            mount_table: table,
            uid: 1000,
        };
        let hint = DeviceHint {
            require_usb_presence: false,
            browse_roots: Vec::new(),
            ..DeviceHint::default()
        };

        let mount = resolver.resolve(&hint).unwrap().unwrap();
        assert_eq!(mount.path, PathBuf::from("/media/me/HERO12 BLACK"));
        assert_eq!(resolver.candidates(&hint).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_absent_without_match() {
        let temp = tempdir().unwrap();
        let table = temp.path().join("mounts");
        fs::write(&table, "/dev/root / ext4 rw 0 0\n").unwrap();

        let resolver = LinuxMountResolver {
            mount_table: table,
            uid: 1000,
        };
        let hint = DeviceHint {
            require_usb_presence: false,
            browse_roots: Vec::new(),
            ..DeviceHint::default()
        };

        assert!(resolver.resolve(&hint).unwrap().is_none());
    }
}
