//! HID channel abstraction.
//!
//! An M210 enumerates as two HID interfaces. The session layer talks to each
//! of them through the [`Channel`] trait so that the protocol logic never
//! touches a file descriptor directly.
//!
//! ```text
//! +-------------------------------+
//! |  DeviceSession / Download     |
//! +---------------+---------------+
//!                 |
//!        +--------+--------+
//!        v                 v
//! +-------------+   +-------------+
//! |   primary   |   |  secondary  |
//! |  (64 byte)  |   |   (9 byte)  |
//! +------+------+   +------+------+
//!        |                 |
//!        v                 v
//!   HidrawChannel     HidrawChannel      (Linux)
//!   MockChannel       MockChannel        (tests)
//! ```

#[cfg(all(feature = "native", target_os = "linux"))]
pub mod hidraw;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::{fmt, time::Duration};

use crate::error::Result;

/// Bus type reported by the kernel for USB HID devices.
pub const BUS_USB: u32 = 0x03;

/// Identity every M210 interface reports.
pub const M210_IDENTITY: DeviceIdentity = DeviceIdentity {
    bus_type: BUS_USB,
    vendor: 0x0e20,
    product: 0x0101,
};

/// Bus, vendor and product triple of a HID interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceIdentity {
    /// Kernel bus type (`BUS_USB` for the M210).
    pub bus_type: u32,
    /// USB vendor ID.
    pub vendor: u16,
    /// USB product ID.
    pub product: u16,
}

impl DeviceIdentity {
    /// Whether this identity belongs to an M210.
    pub fn is_m210(&self) -> bool {
        *self == M210_IDENTITY
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bus {:#04x} {:04x}:{:04x}",
            self.bus_type, self.vendor, self.product
        )
    }
}

/// One HID interface of the device.
///
/// Reads are report oriented: each call returns at most one input report.
/// An elapsed timeout is reported as [`Error::Timeout`](crate::Error::Timeout),
/// never as an empty read.
pub trait Channel: Send {
    /// Identity of the underlying interface.
    fn identity(&self) -> Result<DeviceIdentity>;

    /// Read one report into `buf`, waiting at most `timeout`.
    ///
    /// Returns the number of bytes stored.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write one output report.
    fn write_report(&mut self, data: &[u8]) -> Result<()>;

    /// Path or label of the interface, for logs and errors.
    fn name(&self) -> &str;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn identity(&self) -> Result<DeviceIdentity> {
        (**self).identity()
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_report(buf, timeout)
    }

    fn write_report(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_report(data)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
