//! Locating the logger on the host.
//!
//! The logger enumerates as a USB CDC device with a fixed VID/PID. A
//! [`DeviceLocator`] lists candidate serial ports with whatever USB identity
//! the platform exposes; [`autodetect`] picks the logger among them.

use {
    crate::error::{Error, Result},
    log::{debug, info},
};

#[cfg(target_os = "linux")]
use {
    log::trace,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// USB vendor ID of the logger.
pub const MNEMO_VID: u16 = 0x04D8;

/// USB product ID of the logger.
pub const MNEMO_PID: u16 = 0x00DD;

/// A serial port found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPort {
    /// Device path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Port with no USB metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    /// Whether the port carries the given USB identity.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }

    /// Whether this is the logger.
    pub fn is_mnemo(&self) -> bool {
        self.matches(MNEMO_VID, MNEMO_PID)
    }
}

/// Platform query for serial ports.
pub trait DeviceLocator {
    /// List serial ports with their USB identity where known.
    fn list_ports(&self) -> Result<Vec<DetectedPort>>;

    /// Path of the first port with the given VID/PID.
    fn find_by_vid_pid(&self, vid: u16, pid: u16) -> Result<Option<String>> {
        Ok(self
            .list_ports()?
            .into_iter()
            .find(|p| p.matches(vid, pid))
            .map(|p| p.name))
    }
}

/// Locator backed by `serialport` enumeration.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialportLocator;

#[cfg(feature = "native")]
impl DeviceLocator for SerialportLocator {
    fn list_ports(&self) -> Result<Vec<DetectedPort>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| {
                let mut port = DetectedPort::new(info.port_name);
                if let serialport::SerialPortType::UsbPort(usb) = info.port_type {
                    port.vid = Some(usb.vid);
                    port.pid = Some(usb.pid);
                    port.manufacturer = usb.manufacturer;
                    port.product = usb.product;
                    port.serial = usb.serial_number;
                }
                port
            })
            .collect())
    }
}

/// Default sysfs class directory for TTYs.
#[cfg(target_os = "linux")]
pub const SYS_CLASS_TTY: &str = "/sys/class/tty";

/// Locator reading USB identity from sysfs.
///
/// For each `ttyUSB*`/`ttyACM*` entry the device link is followed and its
/// ancestors are searched for `idVendor`/`idProduct`, stopping once the path
/// leaves the USB tree.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct SysfsLocator {
    root: PathBuf,
}

#[cfg(target_os = "linux")]
impl Default for SysfsLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl SysfsLocator {
    /// Locator over `/sys/class/tty`.
    pub fn new() -> Self {
        Self::with_root(SYS_CLASS_TTY)
    }

    /// Locator over another TTY class directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn describe(&self, tty: &str) -> DetectedPort {
        let mut port = DetectedPort::new(format!("/dev/{tty}"));
        let Ok(mut dir) = fs::canonicalize(self.root.join(tty).join("device")) else {
            return port;
        };

        while dir.to_string_lossy().contains("/usb") {
            let vid = read_hex_id(&dir.join("idVendor"));
            let pid = read_hex_id(&dir.join("idProduct"));
            if let (Some(vid), Some(pid)) = (vid, pid) {
                trace!("{tty}: {vid:04x}:{pid:04x} at {}", dir.display());
                port.vid = Some(vid);
                port.pid = Some(pid);
                port.manufacturer = read_attr(&dir.join("manufacturer"));
                port.product = read_attr(&dir.join("product"));
                port.serial = read_attr(&dir.join("serial"));
                break;
            }
            if !dir.pop() {
                break;
            }
        }
        port
    }
}

#[cfg(target_os = "linux")]
fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "linux")]
fn read_hex_id(path: &Path) -> Option<u16> {
    read_attr(path).and_then(|s| u16::from_str_radix(&s, 16).ok())
}

#[cfg(target_os = "linux")]
impl DeviceLocator for SysfsLocator {
    fn list_ports(&self) -> Result<Vec<DetectedPort>> {
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("ttyUSB") || name.starts_with("ttyACM"))
            .collect();
        names.sort();

        Ok(names
            .iter()
            .map(|name| self.describe(name))
            .collect())
    }
}

/// Locator that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocator;

impl DeviceLocator for NoLocator {
    fn list_ports(&self) -> Result<Vec<DetectedPort>> {
        Ok(Vec::new())
    }
}

/// Best locator for this platform.
pub fn default_locator() -> Box<dyn DeviceLocator> {
    #[cfg(target_os = "linux")]
    {
        Box::new(SysfsLocator::new())
    }
    #[cfg(all(not(target_os = "linux"), feature = "native"))]
    {
        Box::new(SerialportLocator)
    }
    #[cfg(all(not(target_os = "linux"), not(feature = "native")))]
    {
        Box::new(NoLocator)
    }
}

/// Find the port with `vid:pid` using `locator`.
pub fn find_device(locator: &dyn DeviceLocator, vid: u16, pid: u16) -> Result<String> {
    debug!("Looking for USB device {vid:04x}:{pid:04x}");
    let path = locator
        .find_by_vid_pid(vid, pid)?
        .ok_or(Error::DeviceNotFound)?;
    info!("Auto-detected device: {path}");
    Ok(path)
}

/// Find the logger with the platform's default locator.
pub fn autodetect() -> Result<String> {
    find_device(default_locator().as_ref(), MNEMO_VID, MNEMO_PID)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLocator(Vec<DetectedPort>);

    impl DeviceLocator for FixedLocator {
        fn list_ports(&self) -> Result<Vec<DetectedPort>> {
            Ok(self.0.clone())
        }
    }

    fn usb(name: &str, vid: u16, pid: u16) -> DetectedPort {
        DetectedPort {
            vid: Some(vid),
            pid: Some(pid),
            ..DetectedPort::new(name)
        }
    }

    #[test]
    fn test_find_device_matches_vid_pid() {
        let locator = FixedLocator(vec![
            DetectedPort::new("/dev/ttyS0"),
            usb("/dev/ttyUSB0", 0x1A86, 0x7523),
            usb("/dev/ttyACM0", MNEMO_VID, MNEMO_PID),
        ]);
        assert_eq!(
            find_device(&locator, MNEMO_VID, MNEMO_PID).unwrap(),
            "/dev/ttyACM0"
        );
    }

    #[test]
    fn test_find_device_not_found() {
        let locator = FixedLocator(vec![usb("/dev/ttyUSB0", 0x1A86, 0x7523)]);
        assert!(matches!(
            find_device(&locator, MNEMO_VID, MNEMO_PID),
            Err(Error::DeviceNotFound)
        ));
        assert!(matches!(
            find_device(&NoLocator, MNEMO_VID, MNEMO_PID),
            Err(Error::DeviceNotFound)
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sysfs_locator_walks_up_usb_tree() {
        use std::os::unix::fs::symlink;

        let sys = tempfile::tempdir().unwrap();
        let usb_dev = sys.path().join("devices/pci0000:00/usb1/1-1");
        let interface = usb_dev.join("1-1:1.0");
        fs::create_dir_all(&interface).unwrap();
        fs::write(usb_dev.join("idVendor"), "04d8\n").unwrap();
        fs::write(usb_dev.join("idProduct"), "00dd\n").unwrap();
        fs::write(usb_dev.join("product"), "MNEMO\n").unwrap();

        let other_dev = sys.path().join("devices/pci0000:00/usb2/2-1");
        let other_interface = other_dev.join("2-1:1.0");
        fs::create_dir_all(&other_interface).unwrap();
        fs::write(other_dev.join("idVendor"), "1a86\n").unwrap();
        fs::write(other_dev.join("idProduct"), "7523\n").unwrap();

        let class = sys.path().join("class/tty");
        for (tty, target) in [("ttyACM0", &interface), ("ttyUSB0", &other_interface)] {
            fs::create_dir_all(class.join(tty)).unwrap();
            symlink(target, class.join(tty).join("device")).unwrap();
        }
        fs::create_dir_all(class.join("ttyS0")).unwrap();

        let locator = SysfsLocator::with_root(&class);
        let ports = locator.list_ports().unwrap();
        assert_eq!(ports.len(), 2);
        assert!(ports[0].is_mnemo());
        assert_eq!(ports[0].product.as_deref(), Some("MNEMO"));
        assert_eq!(ports[1].vid, Some(0x1A86));

        assert_eq!(
            find_device(&locator, MNEMO_VID, MNEMO_PID).unwrap(),
            "/dev/ttyACM0"
        );
    }

    #[test]
    fn test_default_locator_does_not_panic() {
        let _ = default_locator().list_ports();
    }
}
