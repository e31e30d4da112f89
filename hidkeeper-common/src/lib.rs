use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Re-export common dependencies
pub use tracing;

// Keymap tables and per-device patches
pub mod keymap;

/// Maximum number of device table slots, including the root controller at
/// slot 0. Also caps the ignore list.
pub const DEV_MAX: usize = 9;

/// USB vendor/product identifier pair.
///
/// The all-zero pair is reserved: it marks a free slot in fixed-capacity
/// id lists and terminates the effective list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbId {
    pub vendor: u16,
    pub product: u16,
}

impl UsbId {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }

    /// True for the reserved all-zero id.
    pub fn is_empty(&self) -> bool {
        self.vendor == 0 && self.product == 0
    }

    /// Parse a `vid:pid` pair in hex, e.g. `046d:c21f`.
    pub fn parse(s: &str) -> Option<Self> {
        let (vid, pid) = s.split_once(':')?;
        let vendor = u16::from_str_radix(vid, 16).ok()?;
        let product = u16::from_str_radix(pid, 16).ok()?;
        Some(Self { vendor, product })
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// Connection status of a device table slot.
///
/// A slot's status may only be read or written while holding that slot's
/// lock; the zero value is `Unused`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[default]
    Unused,
    Connecting,
    Connected,
}

impl DeviceStatus {
    /// Connecting and Connected slots both hold live transport state that
    /// must be reverted and released at shutdown.
    pub fn is_active(self) -> bool {
        matches!(self, DeviceStatus::Connecting | DeviceStatus::Connected)
    }
}

/// Information about a managed peripheral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub id: UsbId,
    pub serial: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (VID: {:04X}, PID: {:04X})",
            self.name, self.id.vendor, self.id.product
        )
    }
}

/// Fatal startup conditions: each aborts the daemon before any device
/// state exists, so no teardown is required.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("another instance is already running (PID {0})")]
    AlreadyRunning(i32),
    #[error("daemon must be run as root")]
    InsufficientPrivileges,
    #[error("failed to initialize monotonic clock: {0}")]
    MonotonicClock(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_id_parse() {
        let id = UsbId::parse("046d:c21f").unwrap();
        assert_eq!(id.vendor, 0x046d);
        assert_eq!(id.product, 0xc21f);
        assert_eq!(id.to_string(), "046d:c21f");
    }

    #[test]
    fn test_usb_id_parse_malformed() {
        assert!(UsbId::parse("046d").is_none());
        assert!(UsbId::parse("zzzz:c21f").is_none());
        assert!(UsbId::parse("046d:c21f:extra").is_none());
        assert!(UsbId::parse("").is_none());
    }

    #[test]
    fn test_usb_id_empty_is_reserved() {
        assert!(UsbId::default().is_empty());
        assert!(!UsbId::new(0x1b1c, 0x1b2d).is_empty());
    }

    #[test]
    fn test_status_defaults_to_unused() {
        assert_eq!(DeviceStatus::default(), DeviceStatus::Unused);
        assert!(!DeviceStatus::Unused.is_active());
        assert!(DeviceStatus::Connecting.is_active());
        assert!(DeviceStatus::Connected.is_active());
    }
}
