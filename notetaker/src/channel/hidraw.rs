//! Linux hidraw channel.
//!
//! Each M210 interface shows up as a `/dev/hidrawN` node. Reports are read
//! with `poll(2)` so that a silent device surfaces as a timeout instead of a
//! blocked thread.

use {
    crate::{
        channel::{Channel, DeviceIdentity},
        error::{Error, Result},
    },
    log::trace,
    std::{
        fs::{File, OpenOptions},
        io::{self, Read, Write},
        os::fd::AsRawFd,
        path::Path,
        time::Duration,
    },
};

// Linux uapi: #define HIDIOCGRAWINFO _IOR('H', 0x03, struct hidraw_devinfo) = 0x80084803
const HIDIOCGRAWINFO: libc::c_ulong = 0x8008_4803;

/// `struct hidraw_devinfo` from `<linux/hidraw.h>`.
#[repr(C)]
#[derive(Default)]
struct HidrawDevinfo {
    bustype: u32,
    vendor: i16,
    product: i16,
}

/// A hidraw node opened for report I/O.
#[derive(Debug)]
pub struct HidrawChannel {
    file: File,
    name: String,
    writable: bool,
}

impl HidrawChannel {
    /// Open the command interface (read/write).
    pub fn open_primary(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), true)
    }

    /// Open the event interface (read only).
    pub fn open_secondary(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), false)
    }

    fn open(path: &Path, writable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)?;

        trace!("Opened {} (writable: {writable})", path.display());

        Ok(Self {
            file,
            name: path
                .display()
                .to_string(),
            writable,
        })
    }

    fn wait_readable(&self, timeout: Duration) -> Result<()> {
        let mut pfd = libc::pollfd {
            fd: self
                .file
                .as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        loop {
            // SAFETY: pfd is a valid pollfd for an fd owned by self.file.
            #[allow(unsafe_code)]
            let ret = unsafe { libc::poll(&raw mut pfd, 1, millis) };
            if ret > 0 {
                return Ok(());
            }
            if ret == 0 {
                return Err(Error::Timeout(format!(
                    "no report from {} within {}ms",
                    self.name,
                    timeout.as_millis()
                )));
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }
    }
}

impl Channel for HidrawChannel {
    // The kernel stores the 16-bit IDs as signed shorts.
    #[allow(clippy::cast_sign_loss)]
    fn identity(&self) -> Result<DeviceIdentity> {
        let mut info = HidrawDevinfo::default();

        // SAFETY: info is a writable hidraw_devinfo and the fd stays open for
        // the duration of the call.
        #[allow(unsafe_code)]
        let ret = unsafe {
            libc::ioctl(
                self.file
                    .as_raw_fd(),
                HIDIOCGRAWINFO as _,
                &raw mut info,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(DeviceIdentity {
            bus_type: info.bustype,
            vendor: info.vendor as u16,
            product: info.product as u16,
        })
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.wait_readable(timeout)?;
        let n = self
            .file
            .read(buf)?;
        trace!("{} <- {:02x?}", self.name, &buf[..n]);
        Ok(n)
    }

    fn write_report(&mut self, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::Unsupported(format!(
                "{} was opened read-only",
                self.name
            )));
        }
        trace!("{} -> {:02x?}", self.name, data);
        self.file
            .write_all(data)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devinfo_layout() {
        assert_eq!(std::mem::size_of::<HidrawDevinfo>(), 8);
    }

    #[test]
    fn test_open_missing_node() {
        let err = HidrawChannel::open_primary("/nonexistent/hidraw99")
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_secondary_is_read_only() {
        // Any readable file works for checking the open mode.
        let tmp = tempfile::NamedTempFile::new().unwrap();

        let mut channel = HidrawChannel::open_secondary(tmp.path()).unwrap();
        let err = channel
            .write_report(&[0x00, 0x02, 0x01, 0x95])
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
