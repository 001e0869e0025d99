//! # notetaker
//!
//! A library for talking to Pegasus Mobile NoteTaker M210 digital pens.
//!
//! The M210 exposes two HID interfaces. The first carries a small
//! request/response protocol used to query the device, erase its memory and
//! download the stored note archive; the second only reports button events.
//! This crate provides:
//!
//! - A [`Channel`] abstraction over one HID interface, with a native Linux
//!   hidraw implementation
//! - The request/response frame codec
//! - [`DeviceSession`], which runs the ready handshake and upload negotiation
//! - A download engine that detects lost packets and re-requests them
//! - hidraw device discovery through sysfs
//!
//! Note payload bytes are treated as opaque; decoding pen strokes is left to
//! the caller.
//!
//! ## Features
//!
//! - `native` (default): hidraw channel and device discovery on Linux
//! - `mock`: scripted in-memory channels for downstream tests
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use notetaker::SessionConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(all(feature = "native", target_os = "linux"))]
//!     {
//!         let paths = notetaker::find_device()?;
//!         let mut session = notetaker::open_session(&paths, SessionConfig::default())?;
//!
//!         let info = session.get_device_info()?;
//!         println!("{} bytes stored", info.download_size);
//!
//!         let mut file = std::fs::File::create("m210notes")?;
//!         session.download_notes(&mut file)?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod channel;
pub mod device;
pub mod download;
pub mod error;
pub mod protocol;
pub mod session;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register the process-wide interruption checker.
///
/// Ready polling, streaming and packet recovery consult it between reads and
/// stop with [`Error::Interrupted`] once it returns `true`. Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(all(feature = "native", target_os = "linux"))]
pub use {
    channel::hidraw::HidrawChannel,
    device::{HidrawSession, open_session},
};
pub use {
    channel::{BUS_USB, Channel, DeviceIdentity, M210_IDENTITY},
    device::{DetectedInterface, DevicePaths, detect_interfaces, find_device, find_devices},
    download::{DownloadEngine, DownloadState, LostPackets},
    error::{Error, Result},
    protocol::{DataPacket, DeviceInfo, Opcode, ReadyStatus, RequestFrame},
    session::{CancelToken, DeviceSession, SessionConfig},
};
