//! Port abstraction for the serial link to the bootloader.
//!
//! The protocol layer never touches the `serialport` crate directly. It talks
//! to a [`Port`], which keeps the engine testable against a simulated device
//! and leaves room for other backends.
//!
//! ```text
//! +------------------+
//! |  Flasher engine  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Frame codec /    |
//! | response waiter  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |   Port trait     |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | NativePort       |
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use tlflash::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> tlflash::Result<()> {
//!     port.send(&[0x00, 0x00, 0x00])?;
//!     let reply = port.read_available()?;
//!     println!("Received: {reply:?}");
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate used while entering the bootloader and for the version query.
pub const HANDSHAKE_BAUD: u32 = 500_000;

/// Baud rate used for data transfer once the bootloader answered.
pub const TRANSFER_BAUD: u32 = 921_600;

/// Fixed read timeout at the transport layer.
pub const READ_TIMEOUT: Duration = Duration::from_millis(300);

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate the port is opened with.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: HANDSHAKE_BAUD,
            timeout: READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a configuration for the given port at the handshake baud rate.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the initial baud rate.
    #[must_use]
    pub fn with_baud(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte-stream duplex channel to the bootloader.
///
/// Every wait in the protocol is a poll over [`Port::read_available`], so
/// implementations must never block there.
pub trait Port: Read + Write + Send {
    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Discard both input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Drain whatever is currently buffered without blocking.
    ///
    /// Returns an empty vector when nothing has arrived yet.
    fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Discard stale bytes in both directions, then write `data` and flush.
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.clear_buffers()?;
        std::io::Write::write_all(self, data)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
