//! Error types for notetaker.

use std::io;
use thiserror::Error;

use crate::channel::DeviceIdentity;

/// Result type for notetaker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for notetaker operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (hidraw node, sink writes).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The opened node does not belong to an M210.
    #[error("{path} is not an M210 hidraw device (expected {expected}, found {actual})")]
    IdentityMismatch {
        /// Path of the rejected node.
        path: String,
        /// Signature the driver accepts.
        expected: DeviceIdentity,
        /// Signature reported by the node.
        actual: DeviceIdentity,
    },

    /// No response within the read timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A response failed framing or marker validation.
    #[error("Communication error: {0}")]
    Communication(String),

    /// No matching device was found.
    #[error("NoteTaker device not found")]
    DeviceNotFound,

    /// The embedding application requested cancellation.
    #[error("Operation interrupted")]
    Interrupted,

    /// Unsupported platform or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether this is a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
