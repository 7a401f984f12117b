use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::models::MountPoint;

/// Placeholder in a mount root that is replaced by the real user id.
const UID_PLACEHOLDER: &str = "{uid}";

/// Identity of the camera we are waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceHint {
    /// Case-insensitive regular expressions matched against mount paths,
    /// mount sources and udev properties.
    pub labels: Vec<String>,
    /// USB vendor id, 4 hex digits
    pub vendor_id: Option<String>,
    /// USB product id, 4 hex digits
    pub product_id: Option<String>,
    /// The device is only accepted when mounted below one of these roots
    pub mount_roots: Vec<String>,
    /// Directories whose children are mounts themselves (gvfs)
    pub browse_roots: Vec<String>,
    /// Require the vendor/product pair to be present on the USB bus
    pub require_usb_presence: bool,
}

impl Default for DeviceHint {
    fn default() -> Self {
        Self {
            labels: vec!["gopro".to_string(), r"hero\d+".to_string()],
            vendor_id: Some("2672".to_string()),
            product_id: Some("0059".to_string()),
            mount_roots: vec![
                "/media".to_string(),
                "/run/media".to_string(),
                "/mnt".to_string(),
            ],
            browse_roots: vec![format!("/run/user/{UID_PLACEHOLDER}/gvfs")],
            require_usb_presence: true,
        }
    }
}

impl DeviceHint {
    /// Vendor and product id, when both are configured.
    pub fn usb_ids(&self) -> Option<(&str, &str)> {
        match (&self.vendor_id, &self.product_id) {
            (Some(v), Some(p)) if !v.is_empty() && !p.is_empty() => Some((v, p)),
            _ => None,
        }
    }

    pub fn matcher(&self, uid: u32) -> Result<HintMatcher, regex::Error> {
        let labels = self
            .labels
            .iter()
            .map(|l| RegexBuilder::new(l).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;

        let roots = self
            .mount_roots
            .iter()
            .chain(self.browse_roots.iter())
            .map(|r| expand_root(r, uid))
            .collect();

        Ok(HintMatcher {
            labels,
            usb_ids: self
                .usb_ids()
                .map(|(v, p)| (v.to_lowercase(), p.to_lowercase())),
            roots,
        })
    }

    pub fn expanded_browse_roots(&self, uid: u32) -> Vec<PathBuf> {
        self.browse_roots.iter().map(|r| expand_root(r, uid)).collect()
    }
}

fn expand_root(root: &str, uid: u32) -> PathBuf {
    PathBuf::from(root.replace(UID_PLACEHOLDER, &uid.to_string()))
}

/// A place where something is mounted, before deciding whether it is our camera.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountCandidate {
    pub path: PathBuf,
    pub source: String,
    pub fstype: String,
    /// udev properties of the backing block device, if any
    pub properties: BTreeMap<String, String>,
}

impl From<&MountCandidate> for MountPoint {
    fn from(c: &MountCandidate) -> Self {
        MountPoint {
            path: c.path.clone(),
            source: c.source.clone(),
            fstype: c.fstype.clone(),
        }
    }
}

/// Compiled form of a [`DeviceHint`].
#[derive(Debug)]
pub struct HintMatcher {
    labels: Vec<Regex>,
    usb_ids: Option<(String, String)>,
    roots: Vec<PathBuf>,
}

impl HintMatcher {
    pub fn is_under_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root) && path != root)
    }

    pub fn matches(&self, candidate: &MountCandidate) -> bool {
        if !self.is_under_root(&candidate.path) {
            return false;
        }

        let path = candidate.path.to_string_lossy();
        let texts = [path.as_ref(), candidate.source.as_str()];

        let label_hit = self.labels.iter().any(|re| {
            texts.iter().any(|t| re.is_match(t))
                || candidate.properties.values().any(|v| re.is_match(v))
        });
        if label_hit {
            return true;
        }

        let Some((vendor, product)) = &self.usb_ids else {
            return false;
        };

        let prop_eq = |key: &str, want: &str| {
            candidate
                .properties
                .get(key)
                .is_some_and(|v| v.eq_ignore_ascii_case(want))
        };
        if prop_eq("ID_VENDOR_ID", vendor) && prop_eq("ID_MODEL_ID", product) {
            return true;
        }

        texts.iter().any(|t| {
            let t = t.to_lowercase();
            t.contains(vendor.as_str()) && t.contains(product.as_str())
        })
    }
}

/// Pick the camera among the mount candidates.
///
/// When the device shows up at several places (one per partition, or both a
/// block mount and a gvfs mount) the lexicographically first path wins.
pub fn select_mount(candidates: &[MountCandidate], matcher: &HintMatcher) -> Option<MountPoint> {
    candidates
        .iter()
        .filter(|c| matcher.matches(c))
        .min_by(|a, b| a.path.cmp(&b.path))
        .map(MountPoint::from)
}

/// Parse a `/proc/mounts` style table into candidates.
pub fn parse_mount_table(content: &str) -> Vec<MountCandidate> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let path = fields.next()?;
            let fstype = fields.next()?;
            Some(MountCandidate {
                path: PathBuf::from(unescape_mount_field(path)),
                source: unescape_mount_field(source),
                fstype: fstype.to_string(),
                properties: BTreeMap::new(),
            })
        })
        .collect()
}

/// Decode the octal escapes (`\040` for a space) the kernel uses in mount tables.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Finds where the camera is mounted.
///
/// Implementations must have no side effects and return quickly; callers
/// invoke them repeatedly while polling.
pub trait MountResolver: Send + Sync {
    fn resolve(&self, hint: &DeviceHint) -> Result<Option<MountPoint>>;

    /// Every mount the resolver can see, for diagnostics.
    fn candidates(&self, hint: &DeviceHint) -> Result<Vec<MountCandidate>>;
}
