//! Bootloader entry strategies.
//!
//! Getting the chip into its UART bootloader is board specific. The flasher
//! only needs a yes/no answer, so the strategy sits behind
//! [`BootloaderEntry`]. Any `FnMut(&mut dyn Port) -> bool` closure works too.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::Result;
use crate::port::Port;

/// Puts the target into bootloader mode.
pub trait BootloaderEntry {
    /// Attempt to enter bootloader mode; `false` means the attempt failed.
    fn enter_bootloader(&mut self, port: &mut dyn Port) -> bool;
}

impl<F> BootloaderEntry for F
where
    F: FnMut(&mut dyn Port) -> bool,
{
    fn enter_bootloader(&mut self, port: &mut dyn Port) -> bool {
        self(port)
    }
}

/// Assume the chip already sits in the bootloader.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReset;

impl BootloaderEntry for NoReset {
    fn enter_bootloader(&mut self, _port: &mut dyn Port) -> bool {
        debug!("Skipping reset, expecting the bootloader to be active");
        true
    }
}

/// Reset the target by pulsing RTS, which is wired to the module's RST pin.
#[derive(Debug, Clone, Copy)]
pub struct RtsReset {
    /// How long RST is held asserted.
    pub hold: Duration,
    /// Delay after release before the bootloader accepts commands.
    pub boot_delay: Duration,
}

impl Default for RtsReset {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(50),
            boot_delay: Duration::from_millis(50),
        }
    }
}

impl RtsReset {
    fn pulse(&self, port: &mut dyn Port) -> Result<()> {
        port.set_rts(true)?;
        thread::sleep(self.hold);
        port.set_rts(false)?;
        port.clear_buffers()
    }
}

impl BootloaderEntry for RtsReset {
    fn enter_bootloader(&mut self, port: &mut dyn Port) -> bool {
        debug!("Resetting target via RTS on {}", port.name());

        match self.pulse(port) {
            Ok(()) => {
                thread::sleep(self.boot_delay);
                true
            },
            Err(e) => {
                warn!("RTS reset failed: {e}");
                false
            },
        }
    }
}
