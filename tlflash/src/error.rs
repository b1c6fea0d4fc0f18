//! Error types for tlflash.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::frame::Command;

/// Result type for tlflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tlflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial port could not be opened.
    #[error("Failed to open port {port}: {reason}")]
    PortOpen {
        /// Port name/path.
        port: String,
        /// Underlying failure description.
        reason: String,
    },

    /// Bootloader entry or version handshake failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Operation attempted without a connected session.
    #[error("Not connected to a device in bootloader mode")]
    NotConnected,

    /// No success tag arrived within the poll ceiling.
    #[error("Timeout waiting for {command:?} response after {waited:?}")]
    CommandTimeout {
        /// Command that timed out.
        command: Command,
        /// Approximate time spent waiting.
        waited: Duration,
    },

    /// A chunk of a bulk transfer failed; the prefix stays on the device/sink.
    #[error("{command:?} failed at 0x{address:08X} after {transferred} bytes")]
    ChunkTransfer {
        /// Command used for the failing chunk.
        command: Command,
        /// Address of the failing chunk.
        address: u32,
        /// Bytes successfully transferred before the failure.
        transferred: usize,
    },

    /// Operation stopped between chunks by the interrupt checker.
    #[error("Operation interrupted")]
    Interrupted,

    /// Argument outside of what the wire format can express.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
