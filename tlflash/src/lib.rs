//! # tlflash
//!
//! A library for flashing Telink TLSR chips through their UART bootloader.
//!
//! This crate provides:
//!
//! - the bootloader command frame codec (version, write, read, erase, chip info)
//! - tag matching over the unframed reply stream
//! - a [`Flasher`] session driving the handshake and chunked transfers
//! - bootloader entry strategies ([`RtsReset`], [`NoReset`], closures)
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tlflash::{Flasher, RtsReset};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = Flasher::open("/dev/ttyUSB0", RtsReset::default())?;
//!         flasher.connect()?;
//!
//!         flasher.erase_sectors(0x0, 16, |_| {})?;
//!         let written = flasher.write_flash(0x0, &std::fs::read("app.bin")?, |p| {
//!             println!("{:.0}%", p.fraction() * 100.0);
//!         })?;
//!         println!("Wrote {written} bytes");
//!
//!         flasher.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod boot;
pub mod error;
pub mod flasher;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled between transfer chunks.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
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
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    boot::{BootloaderEntry, NoReset, RtsReset},
    error::{Error, Result},
    flasher::{Flasher, FlasherConfig, Progress, SessionState},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        chip_info::ChipInfo,
        frame::{Command, CommandFrame},
        waiter::PollConfig,
    },
};
