//! hidraw device discovery.
//!
//! Every hidraw node has an entry under `/sys/class/hidraw` whose `device`
//! link leads to the HID device directory:
//!
//! ```text
//! /sys/devices/.../usb1/1-1/                     USB device
//!                      1-1:1.0/                  USB interface (bInterfaceNumber)
//!                              0003:0E20:0101.0001/
//!                                  uevent        HID_ID=0003:00000E20:00000101
//!                                  hidraw/hidraw0
//! ```
//!
//! An M210 shows up as two such interfaces on the same USB device. Interface
//! 0 carries the command protocol and interface 1 the button events.

use {
    crate::{
        channel::DeviceIdentity,
        error::{Error, Result},
    },
    log::{debug, info, trace},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

#[cfg(all(feature = "native", target_os = "linux"))]
use crate::{
    channel::hidraw::HidrawChannel,
    session::{DeviceSession, SessionConfig},
};

/// sysfs class directory listing hidraw nodes.
pub const SYSFS_HIDRAW_CLASS: &str = "/sys/class/hidraw";

/// Directory holding the hidraw device nodes.
pub const DEV_DIR: &str = "/dev";

/// USB interface number of the command interface.
pub const PRIMARY_INTERFACE: u8 = 0;

/// USB interface number of the event interface.
pub const SECONDARY_INTERFACE: u8 = 1;

/// A hidraw node found in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedInterface {
    /// Kernel name (e.g. "hidraw0").
    pub name: String,
    /// Device node (e.g. "/dev/hidraw0").
    pub node: PathBuf,
    /// Bus, vendor and product from the HID uevent.
    pub identity: Option<DeviceIdentity>,
    /// USB interface number.
    pub interface_number: Option<u8>,
    /// sysfs name of the owning USB device (e.g. "1-1.2").
    pub usb_device: Option<String>,
    /// HID product name (if available).
    pub product: Option<String>,
}

impl DetectedInterface {
    /// Whether this node belongs to an M210.
    pub fn is_m210(&self) -> bool {
        self.identity
            .is_some_and(|identity| identity.is_m210())
    }
}

/// Node paths of one M210.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DevicePaths {
    /// Command interface.
    pub primary: PathBuf,
    /// Event interface.
    pub secondary: PathBuf,
}

/// Parse the `HID_ID` value of a HID uevent (`BBBB:VVVVVVVV:PPPPPPPP`).
pub fn parse_hid_id(value: &str) -> Option<DeviceIdentity> {
    let mut fields = value
        .trim()
        .split(':');
    let bus_type = u32::from_str_radix(fields.next()?, 16).ok()?;
    let vendor = u32::from_str_radix(fields.next()?, 16).ok()?;
    let product = u32::from_str_radix(fields.next()?, 16).ok()?;
    if fields
        .next()
        .is_some()
    {
        return None;
    }

    Some(DeviceIdentity {
        bus_type,
        vendor: u16::try_from(vendor).ok()?,
        product: u16::try_from(product).ok()?,
    })
}

fn uevent_value<'a>(uevent: &'a str, key: &str) -> Option<&'a str> {
    uevent
        .lines()
        .find_map(|line| {
            line.strip_prefix(key)?
                .strip_prefix('=')
        })
}

fn read_interface_number(interface_dir: &Path) -> Option<u8> {
    let raw = fs::read_to_string(interface_dir.join("bInterfaceNumber")).ok()?;
    u8::from_str_radix(raw.trim(), 16).ok()
}

fn inspect_interface(entry: &Path, name: &str, dev_dir: &Path) -> DetectedInterface {
    let mut detected = DetectedInterface {
        name: name.to_string(),
        node: dev_dir.join(name),
        identity: None,
        interface_number: None,
        usb_device: None,
        product: None,
    };

    let Ok(hid_dir) = fs::canonicalize(entry.join("device")) else {
        trace!("{name}: no device link");
        return detected;
    };

    if let Ok(uevent) = fs::read_to_string(hid_dir.join("uevent")) {
        detected.identity = uevent_value(&uevent, "HID_ID").and_then(parse_hid_id);
        detected.product = uevent_value(&uevent, "HID_NAME").map(str::to_string);
    }

    if let Some(interface_dir) = hid_dir.parent() {
        detected.interface_number = read_interface_number(interface_dir);
        detected.usb_device = interface_dir
            .parent()
            .and_then(Path::file_name)
            .map(|n| {
                n.to_string_lossy()
                    .into_owned()
            });
    }

    trace!(
        "Found {name}: identity {:?}, interface {:?}, USB device {:?}",
        detected.identity, detected.interface_number, detected.usb_device
    );
    detected
}

fn node_index(name: &str) -> u32 {
    name.trim_start_matches("hidraw")
        .parse()
        .unwrap_or(u32::MAX)
}

/// List hidraw nodes under the given sysfs class and device directories.
pub fn detect_interfaces_in(class_dir: &Path, dev_dir: &Path) -> Vec<DetectedInterface> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Failed to read {}: {e}", class_dir.display());
            return Vec::new();
        },
    };

    let mut result: Vec<DetectedInterface> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| {
            let name = entry
                .file_name()
                .to_string_lossy()
                .into_owned();
            inspect_interface(&entry.path(), &name, dev_dir)
        })
        .collect();

    result.sort_by_key(|i| node_index(&i.name));
    result
}

/// List every hidraw node on the system.
pub fn detect_interfaces() -> Vec<DetectedInterface> {
    detect_interfaces_in(Path::new(SYSFS_HIDRAW_CLASS), Path::new(DEV_DIR))
}

/// Pair the command and event interfaces of every M210 in `interfaces`.
///
/// Interfaces are paired when they hang off the same USB device. Pairs are
/// returned in command interface node order.
pub fn pair_all_interfaces(interfaces: &[DetectedInterface]) -> Vec<DevicePaths> {
    let candidates: Vec<&DetectedInterface> = interfaces
        .iter()
        .filter(|i| i.is_m210())
        .collect();

    let mut pairs = Vec::new();
    for primary in candidates
        .iter()
        .filter(|i| i.interface_number == Some(PRIMARY_INTERFACE))
    {
        let secondary = candidates
            .iter()
            .find(|i| {
                i.interface_number == Some(SECONDARY_INTERFACE) && i.usb_device == primary.usb_device
            });

        match secondary {
            Some(secondary) => pairs.push(DevicePaths {
                primary: primary
                    .node
                    .clone(),
                secondary: secondary
                    .node
                    .clone(),
            }),
            None => debug!("{} has no matching event interface", primary.name),
        }
    }
    pairs
}

/// Pick the command and event interfaces of the first M210 in `interfaces`.
pub fn pair_interfaces(interfaces: &[DetectedInterface]) -> Result<DevicePaths> {
    let paths = pair_all_interfaces(interfaces)
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)?;

    info!(
        "Found M210: {} (commands), {} (events)",
        paths
            .primary
            .display(),
        paths
            .secondary
            .display()
    );
    Ok(paths)
}

/// Every attached M210.
pub fn find_devices() -> Vec<DevicePaths> {
    pair_all_interfaces(&detect_interfaces())
}

/// Locate an attached M210.
pub fn find_device() -> Result<DevicePaths> {
    pair_interfaces(&detect_interfaces())
}

/// Human-readable list of hidraw nodes, M210 interfaces marked.
pub fn format_interface_list(interfaces: &[DetectedInterface]) -> Vec<String> {
    interfaces
        .iter()
        .map(|i| {
            let identity = i
                .identity
                .map_or_else(|| "unknown".to_string(), |id| id.to_string());
            let mut line = format!("{} [{identity}]", i.node.display());
            if let Some(number) = i.interface_number {
                line.push_str(&format!(" interface {number}"));
            }
            if let Some(product) = &i.product {
                line.push_str(&format!(" {product}"));
            }
            if i.is_m210() {
                line.push_str(" (M210)");
            }
            line
        })
        .collect()
}

/// Session over the hidraw nodes of one M210.
#[cfg(all(feature = "native", target_os = "linux"))]
pub type HidrawSession = DeviceSession<HidrawChannel, HidrawChannel>;

/// Open both interfaces and start a session.
///
/// Fails with [`Error::IdentityMismatch`] if either node is not an M210.
#[cfg(all(feature = "native", target_os = "linux"))]
pub fn open_session(paths: &DevicePaths, config: SessionConfig) -> Result<HidrawSession> {
    let primary = HidrawChannel::open_primary(&paths.primary)?;
    let secondary = HidrawChannel::open_secondary(&paths.secondary)?;
    DeviceSession::new(primary, secondary, config)
}
